pub mod error;
pub mod model;
pub mod ports;

pub use error::BotError;
pub use model::{
    file_name_of, ChatId, DeliveryCandidate, DownloadTarget, Incoming, IncomingKind, MessageRef,
    ProgressEvent, SessionState, UserId,
};
pub use ports::{AdminRecord, AuthStore, Notifier};
