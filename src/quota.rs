use crate::error::{ThrottlerError, ThrottlerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Identifier of one kind of remote operation, e.g. `listInboundShipments`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

impl ActionId {
    /// Parse an action identifier. Empty or blank names are rejected.
    pub fn parse(name: &str) -> ThrottlerResult<Self> {
        if name.trim().is_empty() {
            return Err(ThrottlerError::UnknownAction(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActionId {
    type Error = ThrottlerError;

    fn try_from(name: String) -> ThrottlerResult<Self> {
        if name.trim().is_empty() {
            return Err(ThrottlerError::UnknownAction(name));
        }
        Ok(Self(name))
    }
}

impl From<ActionId> for String {
    fn from(action: ActionId) -> Self {
        action.0
    }
}

impl AsRef<str> for ActionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Longest accepted restore period. Waits are scheduled on the runtime clock,
/// so the period has to stay well inside what an `Instant` can be pushed by.
pub const MAX_RESTORE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Admission policy for one action.
///
/// `burst_capacity` calls may go through back to back after an idle period;
/// after that one call is admitted per `restore_period`, the time it takes to
/// regenerate a single token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuota")]
pub struct QuotaSpec {
    burst_capacity: u32,
    #[serde(with = "humantime_serde")]
    restore_period: Duration,
}

impl QuotaSpec {
    pub fn new(burst_capacity: u32, restore_period: Duration) -> ThrottlerResult<Self> {
        if burst_capacity == 0 {
            return Err(ThrottlerError::ValidationError(
                "Burst capacity must be greater than 0".to_string(),
            ));
        }
        if restore_period.is_zero() {
            return Err(ThrottlerError::ValidationError(
                "Restore period must be greater than 0".to_string(),
            ));
        }
        if restore_period > MAX_RESTORE_PERIOD {
            return Err(ThrottlerError::ValidationError(format!(
                "Restore period must not exceed {:?}, got {:?}",
                MAX_RESTORE_PERIOD, restore_period
            )));
        }
        Ok(Self {
            burst_capacity,
            restore_period,
        })
    }

    /// Build a quota from the `[burst, seconds per token]` form.
    pub fn from_secs(burst_capacity: u32, restore_period_secs: f64) -> ThrottlerResult<Self> {
        if !restore_period_secs.is_finite() || restore_period_secs <= 0.0 {
            return Err(ThrottlerError::ValidationError(format!(
                "Restore period must be a positive number of seconds, got {}",
                restore_period_secs
            )));
        }
        let period = Duration::try_from_secs_f64(restore_period_secs)
            .map_err(|e| ThrottlerError::ValidationError(format!("Invalid restore period: {}", e)))?;
        Self::new(burst_capacity, period)
    }

    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    pub fn restore_period(&self) -> Duration {
        self.restore_period
    }
}

/// Accepted spellings of a quota in configuration files.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuota {
    Pair(u32, f64),
    Detailed {
        burst_capacity: u32,
        #[serde(with = "humantime_serde")]
        restore_period: Duration,
    },
}

impl TryFrom<RawQuota> for QuotaSpec {
    type Error = ThrottlerError;

    fn try_from(raw: RawQuota) -> ThrottlerResult<Self> {
        match raw {
            RawQuota::Pair(burst, secs) => QuotaSpec::from_secs(burst, secs),
            RawQuota::Detailed {
                burst_capacity,
                restore_period,
            } => QuotaSpec::new(burst_capacity, restore_period),
        }
    }
}

/// Immutable mapping of actions to their quotas. Actions missing from the
/// table are not throttled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, QuotaSpec>", into = "HashMap<String, QuotaSpec>")]
pub struct ActionQuotaTable {
    quotas: HashMap<ActionId, QuotaSpec>,
}

impl ActionQuotaTable {
    pub fn builder() -> ActionQuotaTableBuilder {
        ActionQuotaTableBuilder::default()
    }

    /// Build a table from `(action, burst, seconds per token)` triples.
    pub fn from_pairs<'a, I>(pairs: I) -> ThrottlerResult<Self>
    where
        I: IntoIterator<Item = (&'a str, u32, f64)>,
    {
        let mut builder = Self::builder();
        for (action, burst, secs) in pairs {
            builder = builder.register(action, QuotaSpec::from_secs(burst, secs)?)?;
        }
        Ok(builder.build())
    }

    pub fn get(&self, action: &ActionId) -> Option<&QuotaSpec> {
        self.quotas.get(action)
    }

    pub fn is_throttled(&self, action: &ActionId) -> bool {
        self.quotas.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActionId, &QuotaSpec)> {
        self.quotas.iter()
    }
}

impl TryFrom<HashMap<String, QuotaSpec>> for ActionQuotaTable {
    type Error = ThrottlerError;

    fn try_from(raw: HashMap<String, QuotaSpec>) -> ThrottlerResult<Self> {
        let mut builder = Self::builder();
        for (action, quota) in raw {
            builder = builder.register(&action, quota)?;
        }
        Ok(builder.build())
    }
}

impl From<ActionQuotaTable> for HashMap<String, QuotaSpec> {
    fn from(table: ActionQuotaTable) -> Self {
        table
            .quotas
            .into_iter()
            .map(|(action, quota)| (action.into(), quota))
            .collect()
    }
}

/// Collects registrations before a table is frozen.
#[derive(Debug, Default)]
pub struct ActionQuotaTableBuilder {
    quotas: HashMap<ActionId, QuotaSpec>,
}

impl ActionQuotaTableBuilder {
    /// Register a quota. A later registration for the same action replaces the earlier one.
    pub fn register(mut self, action: &str, quota: QuotaSpec) -> ThrottlerResult<Self> {
        let action = ActionId::parse(action)?;
        if let Some(previous) = self.quotas.insert(action.clone(), quota) {
            if previous != quota {
                tracing::debug!(action = %action, "Quota registration replaced");
            }
        }
        Ok(self)
    }

    pub fn build(self) -> ActionQuotaTable {
        ActionQuotaTable {
            quotas: self.quotas,
        }
    }
}
