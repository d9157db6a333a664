pub mod relayer_client;
pub mod stake_response;
pub mod tx_response;

pub use relayer_client::RelayerClient;
pub use stake_response::{HealthResponse, StakeCountResponse, StakeDetailsResponse};
pub use tx_response::{ExitTradeResponse, TransactionResponse};
