pub mod influencer;
pub mod ledger;
pub mod signal;
pub mod stake;
pub mod trade_update;

pub use influencer::{Influencer, Subscriber};
pub use ledger::{ProcessedSignalRecord, SummaryIncrement, UserSignalSummary};
pub use signal::{Signal, SignalBatch};
pub use stake::{Stake, StakeDetails};
pub use trade_update::{UpdateKind, UserTradeValueUpdate};
