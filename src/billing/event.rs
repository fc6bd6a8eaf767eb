use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::accounts::repo_types::Correlation;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} object: {source}")]
    Object {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Provider event after signature verification, reduced to what the
/// reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted { email: String, customer_ref: String },
    InvoicePaid { email: String },
    SubscriptionCanceled { customer_ref: String },
    Unrecognized { kind: String },
}

impl PaymentEvent {
    pub fn kind(&self) -> &str {
        match self {
            PaymentEvent::CheckoutCompleted { .. } => CHECKOUT_COMPLETED,
            PaymentEvent::InvoicePaid { .. } => INVOICE_PAID,
            PaymentEvent::SubscriptionCanceled { .. } => SUBSCRIPTION_DELETED,
            PaymentEvent::Unrecognized { kind } => kind.as_str(),
        }
    }

    /// Account lookup key for this event. Checkout and invoice events match
    /// by email; cancellation matches by the stored provider reference.
    pub fn correlation(&self) -> Option<Correlation> {
        match self {
            PaymentEvent::CheckoutCompleted { email, .. } | PaymentEvent::InvoicePaid { email } => {
                Some(Correlation::by_email(email))
            }
            PaymentEvent::SubscriptionCanceled { customer_ref } => {
                Some(Correlation::by_provider_ref(customer_ref))
            }
            PaymentEvent::Unrecognized { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub event: PaymentEvent,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: Value,
}

/// `customer` is an id unless the sender expanded it into an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CustomerField {
    Id(String),
    Expanded { id: String },
}

impl CustomerField {
    fn into_id(self) -> String {
        match self {
            CustomerField::Id(id) | CustomerField::Expanded { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct CheckoutSession {
    customer: Option<CustomerField>,
    customer_details: Option<CustomerDetails>,
    customer_email: Option<String>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Deserialize)]
struct Invoice {
    customer_email: Option<String>,
}

#[derive(Deserialize)]
struct Subscription {
    customer: Option<CustomerField>,
}

fn object<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, EventParseError> {
    serde_json::from_value(value).map_err(|source| EventParseError::Object { kind, source })
}

/// Parses a raw webhook body. Missing correlation fields become empty
/// strings; the reconciler treats those as unmatched rather than rejecting
/// the delivery.
pub fn parse_event(payload: &[u8]) -> Result<ProviderEvent, EventParseError> {
    let envelope: Envelope = serde_json::from_slice(payload).map_err(EventParseError::Envelope)?;
    let object_value = envelope.data.object;

    let event = match envelope.kind.as_str() {
        CHECKOUT_COMPLETED => {
            let session: CheckoutSession = object(CHECKOUT_COMPLETED, object_value)?;
            let email = session
                .customer_details
                .and_then(|d| d.email)
                .or(session.customer_email)
                .unwrap_or_default();
            PaymentEvent::CheckoutCompleted {
                email,
                customer_ref: session.customer.map(CustomerField::into_id).unwrap_or_default(),
            }
        }
        INVOICE_PAID => {
            let invoice: Invoice = object(INVOICE_PAID, object_value)?;
            PaymentEvent::InvoicePaid {
                email: invoice.customer_email.unwrap_or_default(),
            }
        }
        SUBSCRIPTION_DELETED => {
            let sub: Subscription = object(SUBSCRIPTION_DELETED, object_value)?;
            PaymentEvent::SubscriptionCanceled {
                customer_ref: sub.customer.map(CustomerField::into_id).unwrap_or_default(),
            }
        }
        other => PaymentEvent::Unrecognized {
            kind: other.to_string(),
        },
    };

    Ok(ProviderEvent {
        id: envelope.id,
        event,
    })
}
