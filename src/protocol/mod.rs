mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod headers;
pub use headers::HeaderList;

pub mod range;
pub use range::RangeSpec;

pub mod status;

pub mod uri;

mod vary;
pub use vary::Vary;
pub use vary::VaryMatch;

pub mod body;
