use serde::{Deserialize, Serialize};

/// Access-token claims. Tokens are issued by the account service; this
/// crate only reads them.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Claims {
    pub id: String, // user UUID
    pub email: String,
    pub exp: usize, // expiration (as UNIX timestamp)
}
