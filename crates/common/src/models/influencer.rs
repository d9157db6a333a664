use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub address: String,
    pub username: String,
    pub subscribed_at: DateTime<Utc>,
}

/// An influencer is identified by the account name its signals are published under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Influencer {
    pub name: String,
    pub subscribers: Vec<Subscriber>,
}
