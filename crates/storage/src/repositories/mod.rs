pub mod influencer_repo;
pub mod ledger_repo;
pub mod signal_repo;
pub mod stake_repo;
pub mod trade_update_repo;

pub use influencer_repo::InfluencerRepository;
pub use ledger_repo::{ProcessedSignalRepository, SignalSummaryRepository};
pub use signal_repo::SignalRepository;
pub use stake_repo::StakeRepository;
pub use trade_update_repo::TradeUpdateRepository;
