//! URL construction for replica endpoints.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use skein_sync::Replica;
use skein_types::{
    Numbers, QueryReferencesRequest, RangesForSystem, System, TypeResult, WireMessage,
};

/// Encode a message for use as a query parameter value.
pub fn query_param<M: WireMessage>(message: &M) -> TypeResult<String> {
    Ok(URL_SAFE_NO_PAD.encode(message.encode()?))
}

pub fn events(replica: &Replica) -> String {
    format!("{replica}/events")
}

pub fn head(replica: &Replica, system: &System) -> TypeResult<String> {
    Ok(format!("{replica}/head?system={}", query_param(system)?))
}

pub fn ranged_events(replica: &Replica, system: &System, ranges: &RangesForSystem) -> TypeResult<String> {
    Ok(format!(
        "{replica}/events?system={}&ranges={}",
        query_param(system)?,
        query_param(ranges)?
    ))
}

pub fn query_latest(replica: &Replica, system: &System, content_types: &[u64]) -> TypeResult<String> {
    let numbers = Numbers {
        numbers: content_types.to_vec(),
    };
    Ok(format!(
        "{replica}/query_latest?system={}&event_types={}",
        query_param(system)?,
        query_param(&numbers)?
    ))
}

pub fn query_references(replica: &Replica, request: &QueryReferencesRequest) -> TypeResult<String> {
    Ok(format!("{replica}/query_references?query={}", query_param(request)?))
}
