pub(crate) mod command;
pub(crate) mod exercise;
pub(crate) mod output;
pub(crate) mod record;
pub(crate) mod scan;
pub(crate) mod session;
pub(crate) mod stream;
pub(crate) mod ui;

pub use self::command::{Args, Command, DeviceArgs, FakeArgs, LogLevel, OutputFormat};
pub use self::exercise::{ExerciseAction, ExerciseArgs};
pub use self::record::{RecordAction, RecordArgs, StartRecordingArgs};
pub use self::scan::ScanArgs;
pub use self::stream::StreamArgs;
