//! Identity tokens for documents and cells

use crate::error::IdentityParseError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ulid::Ulid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Permanent, lexicographically sortable identifier for a document or cell.
///
/// Rendered as a 26 character Crockford base32 ULID. The leading 48 bits are
/// the creation time in milliseconds, so string order follows creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(Ulid);

impl Identity {
    /// Length of the rendered token.
    pub const LEN: usize = 26;

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Wall-clock time embedded in the token.
    pub fn created_at(&self) -> Timestamp {
        DateTime::<Utc>::from(self.0.datetime())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| IdentityParseError {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<Ulid> for Identity {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Source of new identities.
///
/// Implementations must be callable from several document pipelines at once.
/// Uniqueness against a specific document is checked by the caller.
pub trait IdentityGenerator: Send + Sync {
    fn next(&self) -> Identity;
}

impl<G: IdentityGenerator + ?Sized> IdentityGenerator for &G {
    fn next(&self) -> Identity {
        (**self).next()
    }
}

impl<G: IdentityGenerator + ?Sized> IdentityGenerator for Arc<G> {
    fn next(&self) -> Identity {
        (**self).next()
    }
}

impl<G: IdentityGenerator + ?Sized> IdentityGenerator for Box<G> {
    fn next(&self) -> Identity {
        (**self).next()
    }
}

static SHARED_GENERATOR: Lazy<UlidGenerator> = Lazy::new(UlidGenerator::new);

/// Wall-clock ULID generator.
///
/// Tokens generated within the same millisecond increment the random part,
/// so a burst from one generator is strictly increasing.
pub struct UlidGenerator {
    inner: Mutex<GeneratorState>,
}

struct GeneratorState {
    generator: ulid::Generator,
    last: Option<Ulid>,
}

impl fmt::Debug for UlidGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UlidGenerator").finish_non_exhaustive()
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GeneratorState {
                generator: ulid::Generator::new(),
                last: None,
            }),
        }
    }

    /// Process-wide generator shared by every save pipeline.
    pub fn shared() -> &'static UlidGenerator {
        &SHARED_GENERATOR
    }
}

impl IdentityGenerator for UlidGenerator {
    fn next(&self) -> Identity {
        // A panic elsewhere cannot leave the generator state half-written.
        let mut state = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ulid = match (state.generator.generate(), state.last) {
            (Ok(ulid), _) => ulid,
            (Err(_), Some(last)) => next_millisecond(&mut state.generator, last),
            (Err(_), None) => Ulid::new(),
        };
        state.last = Some(ulid);
        Identity(ulid)
    }
}

/// Moves the generator into the millisecond after `last` once its random
/// part is exhausted, so tokens keep sorting after everything issued.
fn next_millisecond(generator: &mut ulid::Generator, last: Ulid) -> Ulid {
    let slot = last.datetime() + Duration::from_millis(1);
    generator
        .generate_from_datetime(slot)
        .unwrap_or_else(|_| Ulid::from_datetime(slot))
}

// =============================================================================
// TESTS
// =============================================================================
