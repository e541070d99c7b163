use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RouteId);
id_newtype!(FacilityId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Scheduled,
    InTransit,
    Delivered,
    Cancelled,
}

impl RouteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteStatus::Scheduled => "scheduled",
            RouteStatus::InTransit => "in_transit",
            RouteStatus::Delivered => "delivered",
            RouteStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown route status '{0}'")]
pub struct UnknownRouteStatus(pub String);

impl FromStr for RouteStatus {
    type Err = UnknownRouteStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RouteStatus::Scheduled),
            "in_transit" => Ok(RouteStatus::InTransit),
            "delivered" => Ok(RouteStatus::Delivered),
            "cancelled" => Ok(RouteStatus::Cancelled),
            other => Err(UnknownRouteStatus(other.to_string())),
        }
    }
}

/// Transitions the delivery core is allowed to drive on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAction {
    Start,
    Complete,
}

impl DeliveryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryAction::Start => "start",
            DeliveryAction::Complete => "complete",
        }
    }

    /// Status a route must be in for this action to apply.
    pub fn required_status(self) -> RouteStatus {
        match self {
            DeliveryAction::Start => RouteStatus::Scheduled,
            DeliveryAction::Complete => RouteStatus::InTransit,
        }
    }

    pub fn next_status(self) -> RouteStatus {
        match self {
            DeliveryAction::Start => RouteStatus::InTransit,
            DeliveryAction::Complete => RouteStatus::Delivered,
        }
    }
}

impl fmt::Display for DeliveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid action '{0}'; expected 'start' or 'complete'")]
pub struct UnknownDeliveryAction(pub String);

impl FromStr for DeliveryAction {
    type Err = UnknownDeliveryAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(DeliveryAction::Start),
            "complete" => Ok(DeliveryAction::Complete),
            other => Err(UnknownDeliveryAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRoute {
    pub id: RouteId,
    pub status: RouteStatus,
    pub current_load_kg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_storage_id: Option<FacilityId>,
    pub pending_delivery_kg: f64,
    pub updated_at: DateTime<Utc>,
}

impl TransportRoute {
    /// Facility and quantity to credit when this route completes, if any.
    pub fn pending_transfer(&self) -> Option<(FacilityId, f64)> {
        match self.destination_storage_id {
            Some(facility_id) if self.pending_delivery_kg > 0.0 => {
                Some((facility_id, self.pending_delivery_kg))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFacility {
    pub id: FacilityId,
    pub name: String,
    pub current_level_kg: f64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_actions_and_rejects_others() {
        assert_eq!("start".parse::<DeliveryAction>(), Ok(DeliveryAction::Start));
        assert_eq!(
            " complete ".parse::<DeliveryAction>(),
            Ok(DeliveryAction::Complete)
        );
        let err = "pause".parse::<DeliveryAction>().expect_err("pause");
        assert_eq!(err.0, "pause");
    }

    #[test]
    fn route_status_round_trips_through_storage_text() {
        for status in [
            RouteStatus::Scheduled,
            RouteStatus::InTransit,
            RouteStatus::Delivered,
            RouteStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RouteStatus>(), Ok(status));
        }
        assert!("lost".parse::<RouteStatus>().is_err());
    }

    #[test]
    fn pending_transfer_requires_destination_and_positive_quantity() {
        let mut route = TransportRoute {
            id: RouteId(1),
            status: RouteStatus::InTransit,
            current_load_kg: 25.0,
            destination_storage_id: Some(FacilityId(3)),
            pending_delivery_kg: 25.0,
            updated_at: Utc::now(),
        };
        assert_eq!(route.pending_transfer(), Some((FacilityId(3), 25.0)));

        route.pending_delivery_kg = 0.0;
        assert_eq!(route.pending_transfer(), None);

        route.pending_delivery_kg = 10.0;
        route.destination_storage_id = None;
        assert_eq!(route.pending_transfer(), None);
    }
}
