//! Logging backend which writes to a file on a background thread.

use std::{
    fs::File,
    io::Write,
    path::Path,
    sync::{mpsc::Sender, Mutex},
};

use chrono::Local;
use eyre::{eyre, Context};
use log::{Level, Metadata, Record};
use once_cell::sync::OnceCell;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum MessageType {
    Normal,
    Error,
    Warning,
    Debug,
}

impl From<Level> for MessageType {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => MessageType::Error,
            Level::Warn => MessageType::Warning,
            Level::Info => MessageType::Normal,
            Level::Debug | Level::Trace => MessageType::Debug,
        }
    }
}

#[derive(Debug)]
struct Message {
    module: String,
    msg_type: MessageType,
    string: String,
    time: String,
}

impl Message {
    fn line(&self) -> String {
        let level_name = match self.msg_type {
            MessageType::Normal => "info",
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Debug => "debug",
        };

        //      [date time] [module] [level] Text
        format!(
            "[{}] [{}] [{}] {}\n",
            self.time, self.module, level_name, self.string
        )
    }

    fn write_to(&self, out: &mut impl Write) {
        let _ = out.write_all(self.line().as_bytes());
    }
}

struct Logger;

impl Logger {
    fn commit(&self, record: &Record) {
        let module_path = match record.module_path() {
            Some(path) => path,
            None => return,
        };

        let message = Message {
            module: module_path
                .split("::")
                .last()
                .unwrap_or("unknown")
                .to_string(),
            msg_type: record.level().into(),
            string: format!("{}", record.args()),
            time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        };

        // A send only fails once the writer thread has gone, and then there is nowhere left to
        // report it.
        if let Some(Ok(sender)) = MSG_SENDER.get().map(|s| s.lock()) {
            let _ = sender.send(message);
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.commit(record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;
static MSG_SENDER: OnceCell<Mutex<Sender<Message>>> = OnceCell::new();

/// Sends every record logged through the `log` macros to the file at `path`, which is truncated.
///
/// Lines are written by a background thread so callers never wait on the disk. Only the first call
/// in a process can succeed.
pub fn init(path: impl AsRef<Path>) -> eyre::Result<()> {
    let path = path.as_ref();

    let (sender, receiver) = std::sync::mpsc::channel::<Message>();

    MSG_SENDER
        .set(Mutex::new(sender))
        .map_err(|_| eyre!("logging has already been initialised"))?;

    let mut file = File::create(path).wrap_err_with(|| format!("creating log file {:?}", path))?;

    log::set_logger(&LOGGER)
        .map(|_| log::set_max_level(log::LevelFilter::max()))
        .map_err(|err| eyre!("another logger is installed: {}", err))?;

    std::thread::spawn(move || {
        for msg in receiver {
            msg.write_to(&mut file);
        }
    });

    log::info!("Logging to {:?}", path);

    Ok(())
}
