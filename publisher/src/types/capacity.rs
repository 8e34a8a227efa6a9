use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityLimitType {
    Percentage,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimit {
    #[serde(rename = "type")]
    pub limit_type: CapacityLimitType,
    pub value: u64,
}

impl CapacityLimit {
    pub fn percentage(value: u64) -> Self {
        Self { limit_type: CapacityLimitType::Percentage, value }
    }

    pub fn amount(value: u64) -> Self {
        Self { limit_type: CapacityLimitType::Amount, value }
    }

    /// Absolute capacity amount this limit allows, given the capacity issued to the provider
    pub fn resolve(&self, total_capacity_issued: u128) -> u128 {
        match self.limit_type {
            CapacityLimitType::Amount => self.value as u128,
            CapacityLimitType::Percentage => total_capacity_issued.saturating_mul(self.value as u128) / 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimits {
    /// Budget for the capacity this service spends in one epoch
    pub service_limit: CapacityLimit,
    /// Budget for the capacity spent by every client of the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_limit: Option<CapacityLimit>,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self { service_limit: CapacityLimit::percentage(80), total_limit: None }
    }
}
