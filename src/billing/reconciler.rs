use tracing::{error, info, warn};

use super::event::PaymentEvent;
use crate::accounts::repo::{AccountStore, StoreError};
use crate::accounts::repo_types::{Correlation, PaymentRefUpdate, Plan};

/// What a delivery did to the store. Never reported to the provider; every
/// outcome is acknowledged with 200 and logged here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    Unchanged,
    Unmatched,
    Failed,
    Ignored,
}

pub async fn reconcile(store: &dyn AccountStore, event: &PaymentEvent) -> ReconcileOutcome {
    let kind = event.kind();
    let Some(key) = event.correlation() else {
        info!(kind, "ignoring unhandled payment event");
        return ReconcileOutcome::Ignored;
    };
    if key_is_empty(&key) {
        warn!(kind, "payment event carries no correlation key");
        return ReconcileOutcome::Unmatched;
    }

    let result = match event {
        PaymentEvent::CheckoutCompleted { customer_ref, .. } => link_customer(store, &key, customer_ref).await,
        PaymentEvent::InvoicePaid { .. } => change_plan(store, &key, Plan::Pro).await,
        PaymentEvent::SubscriptionCanceled { .. } => change_plan(store, &key, Plan::Free).await,
        PaymentEvent::Unrecognized { .. } => return ReconcileOutcome::Ignored,
    };

    match result {
        Ok(outcome) => {
            info!(kind, %key, ?outcome, "payment event reconciled");
            outcome
        }
        Err(StoreError::NotFound) => {
            warn!(kind, %key, "no account matches payment event");
            ReconcileOutcome::Unmatched
        }
        Err(e) => {
            error!(kind, %key, error = %e, "failed to apply payment event");
            ReconcileOutcome::Failed
        }
    }
}

fn key_is_empty(key: &Correlation) -> bool {
    match key {
        Correlation::ByEmail(v) | Correlation::ByProviderRef(v) => v.is_empty(),
    }
}

async fn link_customer(
    store: &dyn AccountStore,
    key: &Correlation,
    customer_ref: &str,
) -> Result<ReconcileOutcome, StoreError> {
    let customer_ref = customer_ref.trim();
    if customer_ref.is_empty() {
        warn!(%key, "checkout completed without a customer reference");
        return Ok(ReconcileOutcome::Unchanged);
    }
    Ok(match store.update_payment_ref(key, customer_ref).await? {
        PaymentRefUpdate::Linked => ReconcileOutcome::Applied,
        PaymentRefUpdate::Unchanged => ReconcileOutcome::Unchanged,
        PaymentRefUpdate::AlreadyLinked => {
            warn!(%key, customer_ref, "account already linked to another customer; keeping first");
            ReconcileOutcome::Unchanged
        }
    })
}

async fn change_plan(
    store: &dyn AccountStore,
    key: &Correlation,
    plan: Plan,
) -> Result<ReconcileOutcome, StoreError> {
    let previous = store.set_plan(key, plan).await?;
    Ok(if previous == plan {
        ReconcileOutcome::Unchanged
    } else {
        ReconcileOutcome::Applied
    })
}
