use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

use super::errors::{bad_request, internal_error, ApiError};
use super::{PageParams, TransactionRs, TxStatusRs};
use crate::chain::{Adaptor, Network};
use crate::db::{BlockStatus, Repo, Store};

#[derive(Clone)]
pub struct Service {
    repo: Arc<Repo>,
    adaptors: HashMap<Network, Arc<dyn Adaptor>>,
}

impl Service {
    pub fn new(repo: Arc<Repo>, adaptors: HashMap<Network, Arc<dyn Adaptor>>) -> Self {
        Service { repo, adaptors }
    }
}

#[derive(Serialize)]
struct TxStatusResponse {
    status: TxStatusRs,
}

pub async fn not_found() -> HttpResponse {
    ApiError::NotFound.into()
}

/// Current status of a transaction by its hash. A hash the index has never
/// seen, or one whose block has not been confirmed yet, reports `Pending`.
#[get("/transaction/{hash}")]
pub async fn get_transaction_status(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> impl Responder {
    let hash = path.into_inner();

    let row = match service.repo.tx_with_block_by_hash(&hash).await {
        Ok(row) => row,
        Err(err) => {
            error!("tx status lookup failed for {}: {:?}", hash, err);
            return internal_error("transaction lookup failed");
        }
    };

    HttpResponse::Ok().json(TxStatusResponse {
        status: TxStatusRs::from_tx_with_block(row.as_ref()),
    })
}

/// Confirmed balance-event history for an address, newest first.
#[get("/transactions/{address}")]
pub async fn get_address_history(
    service: web::Data<Service>,
    path: web::Path<String>,
    params: web::Query<PageParams>,
) -> impl Responder {
    let address = path.into_inner();
    if address.is_empty() {
        return bad_request("address is required", None);
    }

    let currency = params.get_currency();
    let size = params.get_size();
    let offset = params.get_page() * size;

    match service
        .repo
        .address_history(currency, &address, size, offset)
        .await
    {
        Ok(rows) => {
            let records: Vec<TransactionRs> = rows
                .iter()
                .map(|row| TransactionRs::from_event(row, currency))
                .collect();
            HttpResponse::Ok().json(records)
        }
        Err(err) => {
            error!("address history failed for {}: {:?}", address, err);
            internal_error("history lookup failed")
        }
    }
}

/// Live balance straight from the chain, not from the index.
#[get("/substrate/balance/{address}")]
pub async fn get_balance(
    service: web::Data<Service>,
    path: web::Path<String>,
    params: web::Query<PageParams>,
) -> impl Responder {
    let address = path.into_inner();
    let network = params.get_currency().network();

    let adaptor = match service.adaptors.get(&network) {
        Some(adaptor) => adaptor,
        None => {
            return HttpResponse::from(ApiError::Validation(
                format!("network {} is not enabled", network),
                None,
            ))
        }
    };

    match adaptor.balance(&address).await {
        Ok(balance) => HttpResponse::Ok().json(balance),
        Err(err) => {
            error!("balance request failed for {}: {:?}", address, err);
            internal_error("balance request failed")
        }
    }
}

#[derive(Serialize)]
struct NetworkStatus {
    last_height: String,
    last_scanned_height: String,
    last_notified_height: String,
}

/// Chain tip vs. index progress per enabled network. Heights are reported as
/// decimal strings.
#[get("/status")]
pub async fn get_status(service: web::Data<Service>) -> impl Responder {
    let mut statuses: HashMap<&'static str, NetworkStatus> = HashMap::new();

    for (network, adaptor) in &service.adaptors {
        let last_height = match adaptor.last_height().await {
            Ok(height) => height,
            Err(err) => {
                error!("{}: tip request failed: {:?}", network, err);
                return internal_error("chain tip request failed");
            }
        };

        let scanned = service
            .repo
            .last_block_by_status(*network, BlockStatus::Success)
            .await;
        let notified = service.repo.last_notified_block(*network).await;

        let (scanned, notified) = match (scanned, notified) {
            (Ok(scanned), Ok(notified)) => (scanned, notified),
            (Err(err), _) | (_, Err(err)) => {
                error!("{}: status lookup failed: {:?}", network, err);
                return internal_error("status lookup failed");
            }
        };

        statuses.insert(
            network.as_str(),
            NetworkStatus {
                last_height: last_height.to_string(),
                last_scanned_height: scanned.map(|b| b.number).unwrap_or(0).to_string(),
                last_notified_height: notified.map(|b| b.number).unwrap_or(0).to_string(),
            },
        );
    }

    HttpResponse::Ok().json(statuses)
}
