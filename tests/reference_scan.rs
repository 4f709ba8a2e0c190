mod common;

use std::path::Path;

use soundpatch::{
    codec::tmb::{EntryBody, SoundTrigger, SoundTriggerFields},
    plan_patches, scan::PatchPlan, scan_animation_sound_entries, scan_manifests, ResourceKind,
    Settings,
};

fn write(dir: &Path, name: &str, contents: impl AsRef<[u8]>) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn mod_directory(dir: &Path) {
    write(
        dir,
        "default_mod.json",
        r#"{ "Files": { "sound/bgm/field.scd": "music\\field.scd" } }"#,
    );

    write(
        dir,
        "group_001_attack.json",
        r#"{
            "Name": "Attack",
            "Options": [
                { "Name": "Swing", "Files": { "chara/human/attack.pap": "anim\\attack.pap" } }
            ]
        }"#,
    );

    write(
        dir,
        "group_002_extra.json",
        r#"{
            "Name": "Extra",
            "Options": [
                { "Name": "Flourish", "Files": { "chara/monster/attack.pap": "anim/attack.pap" } },
                { "Name": "Idle", "Files": { "chara/human/idle.pap": "anim/idle.pap" } }
            ]
        }"#,
    );
}

#[test]
fn shared_animation_is_grouped_once() {
    let dir = tempfile::tempdir().unwrap();
    mod_directory(dir.path());

    let index = scan_manifests(dir.path(), ResourceKind::Animation, &Settings::default()).unwrap();

    assert_eq!(index.len(), 2);

    let group = index.get("anim/attack.pap").unwrap();
    let options = group
        .references
        .iter()
        .map(|reference| reference.option_name.as_str())
        .collect::<Vec<_>>();

    assert_eq!(options, vec!["Swing", "Flourish"]);
    assert!(group
        .references
        .iter()
        .all(|reference| reference.resource_path == "anim/attack.pap"));
}

#[test]
fn existing_triggers_drive_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    mod_directory(dir.path());

    let mut timeline = common::timeline_with_actor();
    let track = timeline.tracks()[0].id;
    let mut trigger = SoundTrigger::default();
    trigger.set_resource_path("sound/mod/swing.scd");
    timeline
        .add_entry(track, 3, EntryBody::SoundTrigger(trigger))
        .unwrap();

    let attack = common::animation_document(vec![("cbbm_id0", Some(timeline)), ("cbbm_id1", None)]);
    write(dir.path(), "anim/attack.pap", attack.to_bytes().unwrap());

    // Present but not an animation document: logged and skipped.
    write(dir.path(), "anim/idle.pap", b"garbage");

    let settings = Settings::default();
    let index = scan_manifests(dir.path(), ResourceKind::Animation, &settings).unwrap();
    let records = scan_animation_sound_entries(dir.path(), &index, &settings).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].resource_path, "anim/attack.pap");
    assert_eq!(records[0].animation_name, "cbbm_id0");
    assert_eq!(records[0].sound_path, "sound/mod/swing.scd");

    assert_eq!(
        plan_patches(&index, &records),
        vec![
            PatchPlan::Overwrite {
                animation: "anim/attack.pap".to_string(),
                sound_paths: vec!["sound/mod/swing.scd".to_string()],
            },
            PatchPlan::Inject {
                animation: "anim/idle.pap".to_string(),
            },
        ]
    );
}

#[test]
fn containers_are_indexed_by_route() {
    let dir = tempfile::tempdir().unwrap();
    mod_directory(dir.path());

    let index = scan_manifests(dir.path(), ResourceKind::Container, &Settings::default()).unwrap();

    assert_eq!(index.len(), 1);

    let group = index.get("sound/bgm/field.scd").unwrap();
    assert_eq!(group.references[0].option_name, "(root)");
    assert_eq!(group.references[0].resource_path, "music/field.scd");
}
