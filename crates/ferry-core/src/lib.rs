pub mod author;
pub mod change;
pub mod console;
pub mod destination;
pub mod error;
pub mod fsutil;
pub mod glob;
pub mod hash;
pub mod message;
pub mod origin;
pub mod revision;

pub use author::{Author, Authoring, AuthoringMode};
pub use change::{Change, ChangesResponse, EmptyReason, VisitResult};
pub use console::{Console, LogConsole, PrefixConsole, TestingConsole};
pub use destination::{
    DestinationEffect, Destination, EffectKind, TransformResult, Writer, WriterContext,
    WriterResult, WriterState,
};
pub use error::{ErrorKind, FerryError, Result};
pub use glob::Glob;
pub use message::{ChangeMessage, LabelLine};
pub use origin::{Origin, Reader};
pub use revision::Revision;
