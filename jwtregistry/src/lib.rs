// Life of a token:
// 1. A purpose is registered once with its issuer, key set and options
// 2. Sign: look up the purpose, build iss/iat/exp + extra claims, hand to the codec
// 3. Validate: look up the purpose, hand the token, key set, issuer and
//    clock to the codec, return the private claims
//
// System components:
//  - Registry (purpose -> immutable Context, behind one lock)
//  - Codec (jsonwebtoken; never called with the lock held)
//  - Clock (system time, or fixed for tests)

pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod keyset;
pub mod registry;

mod e2e_tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{Claims, JsonWebTokenCodec, TokenCodec};
pub use config::{ConfigError, RegistryConfig};
pub use context::{Context, ContextOptions};
pub use error::{ErrorKind, RegistryError};
pub use keyset::{Key, KeyError, KeySet};
pub use registry::Registry;
