pub mod monitor;
pub mod sink;
pub mod supervisor;

pub use monitor::{MonitorDeps, MonitorReport, MonitorSettings, MonitorState, SourceMonitor};
pub use sink::{ChannelSink, FanoutSink, LogSink};
pub use supervisor::Supervisor;
