//! Typed requests for the fulfillment inbound shipment actions.

use crate::client::ClientHandle;
use crate::transport::RequestParams;

pub const LIST_INBOUND_SHIPMENTS: &str = "listInboundShipments";
pub const LIST_INBOUND_SHIPMENT_ITEMS: &str = "listInboundShipmentItems";

const PARAM_SELLER_ID: &str = "SellerId";
const PARAM_MARKETPLACE_ID: &str = "MarketplaceId";
const PARAM_SHIPMENT_STATUS_LIST: &str = "ShipmentStatusList";
const PARAM_SHIPMENT_ID_LIST: &str = "ShipmentIdList";
const PARAM_SHIPMENT_ID: &str = "ShipmentId";
const PARAM_LAST_UPDATED_AFTER: &str = "LastUpdatedAfter";
const PARAM_LAST_UPDATED_BEFORE: &str = "LastUpdatedBefore";

/// List shipments by status and/or id, optionally bounded by update time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListInboundShipments {
    pub shipment_status_list: Vec<String>,
    pub shipment_id_list: Vec<String>,
    pub last_updated_after: Option<String>,
    pub last_updated_before: Option<String>,
}

impl ListInboundShipments {
    pub fn with_statuses<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shipment_status_list: statuses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn into_params(self, handle: &ClientHandle) -> RequestParams {
        let mut params = seller_params(handle);
        insert_members(&mut params, PARAM_SHIPMENT_STATUS_LIST, self.shipment_status_list);
        insert_members(&mut params, PARAM_SHIPMENT_ID_LIST, self.shipment_id_list);
        insert_optional(&mut params, PARAM_LAST_UPDATED_AFTER, self.last_updated_after);
        insert_optional(&mut params, PARAM_LAST_UPDATED_BEFORE, self.last_updated_before);
        params
    }
}

/// List the items of one shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct ListInboundShipmentItems {
    pub shipment_id: String,
    pub last_updated_after: Option<String>,
    pub last_updated_before: Option<String>,
}

impl ListInboundShipmentItems {
    pub fn new(shipment_id: impl Into<String>) -> Self {
        Self {
            shipment_id: shipment_id.into(),
            last_updated_after: None,
            last_updated_before: None,
        }
    }

    pub fn into_params(self, handle: &ClientHandle) -> RequestParams {
        let mut params = seller_params(handle);
        params.insert(PARAM_SHIPMENT_ID.to_string(), self.shipment_id);
        insert_optional(&mut params, PARAM_LAST_UPDATED_AFTER, self.last_updated_after);
        insert_optional(&mut params, PARAM_LAST_UPDATED_BEFORE, self.last_updated_before);
        params
    }
}

fn seller_params(handle: &ClientHandle) -> RequestParams {
    let mut params = RequestParams::new();
    params.insert(PARAM_SELLER_ID.to_string(), handle.seller_id().to_string());
    params.insert(
        PARAM_MARKETPLACE_ID.to_string(),
        handle.marketplace_id().to_string(),
    );
    params
}

// Lists go on the wire as `Name.member.1`, `Name.member.2`, ...
fn insert_members(params: &mut RequestParams, name: &str, values: Vec<String>) {
    for (i, value) in values.into_iter().enumerate() {
        params.insert(format!("{}.member.{}", name, i + 1), value);
    }
}

fn insert_optional(params: &mut RequestParams, name: &str, value: Option<String>) {
    if let Some(value) = value {
        params.insert(name.to_string(), value);
    }
}
