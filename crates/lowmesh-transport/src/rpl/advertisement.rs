//! MLE advertisement codec.
//!
//! ```text
//! version(1) | dodag_id(8) | dodag_version(1) | rank(2) |
//!   unicast_channel_offset(2) | flags(1) | count(1) | [destination(8) | cost(2)]*
//! ```

use lowmesh_core::LinkAddr;

use super::constants::{
    ADVERTISED_ROUTE_LEN, ADVERTISEMENT_FIXED_LEN, ADVERTISEMENT_VERSION, FLAG_GROUNDED,
    FLAG_HOLDS_GTK, MAX_ADVERTISED_ROUTES,
};
use crate::error::RoutingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisedRoute {
    pub destination: LinkAddr,
    pub cost: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub dodag_id: LinkAddr,
    pub dodag_version: u8,
    pub rank: u16,
    pub unicast_channel_offset: u16,
    pub grounded: bool,
    pub holds_gtk: bool,
    pub routes: Vec<AdvertisedRoute>,
}

impl Advertisement {
    /// Encode. Routes beyond [`MAX_ADVERTISED_ROUTES`] are not carried.
    pub fn encode(&self) -> Vec<u8> {
        let routes = &self.routes[..self.routes.len().min(MAX_ADVERTISED_ROUTES)];
        let mut out = Vec::with_capacity(ADVERTISEMENT_FIXED_LEN + routes.len() * ADVERTISED_ROUTE_LEN);
        out.push(ADVERTISEMENT_VERSION);
        out.extend_from_slice(self.dodag_id.as_ref());
        out.push(self.dodag_version);
        out.extend_from_slice(&self.rank.to_be_bytes());
        out.extend_from_slice(&self.unicast_channel_offset.to_be_bytes());
        let mut flags = 0;
        if self.grounded {
            flags |= FLAG_GROUNDED;
        }
        if self.holds_gtk {
            flags |= FLAG_HOLDS_GTK;
        }
        out.push(flags);
        out.push(routes.len() as u8);
        for route in routes {
            out.extend_from_slice(route.destination.as_ref());
            out.extend_from_slice(&route.cost.to_be_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, RoutingError> {
        if data.len() < ADVERTISEMENT_FIXED_LEN {
            return Err(RoutingError::MalformedAdvertisement("truncated header"));
        }
        if data[0] != ADVERTISEMENT_VERSION {
            return Err(RoutingError::UnsupportedVersion(data[0]));
        }
        let dodag_id = addr_at(data, 1)?;
        let dodag_version = data[9];
        let rank = u16::from_be_bytes([data[10], data[11]]);
        let unicast_channel_offset = u16::from_be_bytes([data[12], data[13]]);
        let flags = data[14];
        let count = data[15] as usize;

        let body = &data[ADVERTISEMENT_FIXED_LEN..];
        if body.len() != count * ADVERTISED_ROUTE_LEN {
            return Err(RoutingError::MalformedAdvertisement("route count does not match length"));
        }
        let routes = body
            .chunks_exact(ADVERTISED_ROUTE_LEN)
            .map(|chunk| {
                Ok(AdvertisedRoute {
                    destination: addr_at(chunk, 0)?,
                    cost: u16::from_be_bytes([chunk[8], chunk[9]]),
                })
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;

        Ok(Self {
            dodag_id,
            dodag_version,
            rank,
            unicast_channel_offset,
            grounded: flags & FLAG_GROUNDED != 0,
            holds_gtk: flags & FLAG_HOLDS_GTK != 0,
            routes,
        })
    }
}

fn addr_at(data: &[u8], at: usize) -> Result<LinkAddr, RoutingError> {
    data.get(at..at + 8)
        .and_then(|b| LinkAddr::try_from(b).ok())
        .ok_or(RoutingError::MalformedAdvertisement("truncated address"))
}
