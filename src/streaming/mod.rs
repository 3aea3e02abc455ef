//! Streaming delivery: turns cursor logs into live, resumable client streams.

pub mod multiplexer;
pub mod pull;
pub mod session;
pub mod single_stream;
pub mod sink;
pub mod subscription_set;
pub mod tail;

pub use multiplexer::Multiplexer;
pub use pull::{pull, PullPage};
pub use session::{CloseReason, ControlMessage, Inbound, PushSession, SessionReport, SessionState};
pub use single_stream::SingleStreamSession;
pub use sink::{BatchSink, ChannelSink, EntrySink};
pub use subscription_set::{SubscriptionIntent, SubscriptionSet};
pub use tail::{poll_key, TailStep, Terminal};
