use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    family_account::FamilyAccount,
    member::{Member, MemberStatus},
    webhook_event::WebhookEventLog,
};
use crate::services::stripe::WebhookEvent;

#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event {0} is missing {1}")]
    MalformedEvent(String, &'static str),
}

/// State change a payment event asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAction {
    CheckoutCompleted {
        member_id: Option<Uuid>,
        family_account_id: Option<Uuid>,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    },
    PaymentSucceeded {
        subscription_id: String,
    },
    PaymentFailed {
        subscription_id: String,
    },
    SubscriptionCancelled {
        subscription_id: String,
        member_id: Option<Uuid>,
    },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { members_updated: usize },
    Duplicate,
    Ignored,
}

fn str_field<'a>(object: &'a JsonValue, key: &str) -> Option<&'a str> {
    object.get(key).and_then(JsonValue::as_str).filter(|s| !s.is_empty())
}

fn metadata_uuid(object: &JsonValue, key: &str) -> Option<Uuid> {
    object
        .get("metadata")
        .and_then(|m| str_field(m, key))
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Maps a provider event onto the membership change it implies
pub fn classify(event: &WebhookEvent) -> Result<BillingAction, BillingError> {
    let object = &event.data.object;
    let require_subscription = |key: &str| {
        str_field(object, key)
            .map(str::to_string)
            .ok_or_else(|| BillingError::MalformedEvent(event.id.clone(), "a subscription id"))
    };

    let action = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let member_id = metadata_uuid(object, "member_id");
            let family_account_id = metadata_uuid(object, "family_account_id");
            if member_id.is_none() && family_account_id.is_none() {
                return Err(BillingError::MalformedEvent(
                    event.id.clone(),
                    "member or family metadata",
                ));
            }
            BillingAction::CheckoutCompleted {
                member_id,
                family_account_id,
                customer_id: str_field(object, "customer").map(str::to_string),
                subscription_id: str_field(object, "subscription").map(str::to_string),
            }
        }
        "invoice.paid" | "invoice.payment_succeeded" => BillingAction::PaymentSucceeded {
            subscription_id: require_subscription("subscription")?,
        },
        "invoice.payment_failed" => BillingAction::PaymentFailed {
            subscription_id: require_subscription("subscription")?,
        },
        "customer.subscription.deleted" => BillingAction::SubscriptionCancelled {
            subscription_id: require_subscription("id")?,
            member_id: metadata_uuid(object, "member_id"),
        },
        _ => BillingAction::Ignored,
    };

    Ok(action)
}

/// Moves every member on a subscription whose current status allows it
async fn transition_subscription(
    pool: &PgPool,
    subscription_id: &str,
    from: &[MemberStatus],
    to: MemberStatus,
) -> Result<usize, sqlx::Error> {
    let mut updated = 0;
    for member in Member::list_by_subscription(pool, subscription_id).await? {
        let current = member.status();
        if from.contains(&current) && current.can_transition_to(to) {
            Member::set_status(pool, member.id, to).await?;
            updated += 1;
        }
    }
    Ok(updated)
}

async fn apply_action(pool: &PgPool, action: BillingAction) -> Result<usize, BillingError> {
    let updated = match action {
        BillingAction::CheckoutCompleted {
            member_id,
            family_account_id,
            customer_id,
            subscription_id,
        } => {
            let mut member_ids: Vec<Uuid> = member_id.into_iter().collect();

            if let Some(family_id) = family_account_id {
                FamilyAccount::set_stripe_ids(
                    pool,
                    family_id,
                    customer_id.as_deref(),
                    subscription_id.as_deref(),
                )
                .await?;
                for member in Member::list_by_family(pool, family_id).await? {
                    if !member_ids.contains(&member.id) {
                        member_ids.push(member.id);
                    }
                }
            }

            for id in &member_ids {
                Member::activate_subscription(
                    pool,
                    *id,
                    customer_id.as_deref(),
                    subscription_id.as_deref(),
                )
                .await?;
            }
            member_ids.len()
        }
        BillingAction::PaymentSucceeded { subscription_id } => {
            transition_subscription(
                pool,
                &subscription_id,
                &[MemberStatus::PastDue],
                MemberStatus::Active,
            )
            .await?
        }
        BillingAction::PaymentFailed { subscription_id } => {
            transition_subscription(
                pool,
                &subscription_id,
                &[MemberStatus::Active],
                MemberStatus::PastDue,
            )
            .await?
        }
        BillingAction::SubscriptionCancelled {
            subscription_id,
            member_id,
        } => {
            let mut updated = transition_subscription(
                pool,
                &subscription_id,
                &[MemberStatus::Pending, MemberStatus::Active, MemberStatus::PastDue],
                MemberStatus::Cancelled,
            )
            .await?;

            // Subscription id may not have been linked yet if checkout
            // completion was never delivered
            if updated == 0 {
                if let Some(member) = match member_id {
                    Some(id) => Member::find_by_id(pool, id).await?,
                    None => None,
                } {
                    if member.status().can_transition_to(MemberStatus::Cancelled) {
                        Member::set_status(pool, member.id, MemberStatus::Cancelled).await?;
                        updated = 1;
                    }
                }
            }
            updated
        }
        BillingAction::Ignored => 0,
    };

    Ok(updated)
}

/// Applies a verified webhook event once.
///
/// The event id is recorded before processing; if processing fails the
/// record is removed so the provider's retry is not treated as a duplicate.
#[tracing::instrument(skip(pool, event), fields(event_id = %event.id, event_type = %event.event_type))]
pub async fn apply_webhook_event(
    pool: &PgPool,
    event: &WebhookEvent,
) -> Result<WebhookOutcome, BillingError> {
    let action = classify(event)?;
    if action == BillingAction::Ignored {
        tracing::debug!("Ignoring unhandled event type");
        return Ok(WebhookOutcome::Ignored);
    }

    if !WebhookEventLog::record(pool, &event.id, &event.event_type).await? {
        tracing::info!("Duplicate webhook delivery, skipping");
        return Ok(WebhookOutcome::Duplicate);
    }

    match apply_action(pool, action).await {
        Ok(members_updated) => {
            tracing::info!(members_updated, "Webhook event applied");
            Ok(WebhookOutcome::Applied { members_updated })
        }
        Err(e) => {
            if let Err(forget_err) = WebhookEventLog::forget(pool, &event.id).await {
                tracing::error!(error = %forget_err, "Failed to clear webhook record after error");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: JsonValue) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_123",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_checkout_completed_reads_metadata() {
        let member_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let action = classify(&event(
            "checkout.session.completed",
            json!({
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {
                    "member_id": member_id.to_string(),
                    "family_account_id": family_id.to_string()
                }
            }),
        ))
        .unwrap();

        assert_eq!(
            action,
            BillingAction::CheckoutCompleted {
                member_id: Some(member_id),
                family_account_id: Some(family_id),
                customer_id: Some("cus_1".to_string()),
                subscription_id: Some("sub_1".to_string()),
            }
        );
    }

    #[test]
    fn test_checkout_without_metadata_is_malformed() {
        let result = classify(&event(
            "checkout.session.completed",
            json!({ "customer": "cus_1", "metadata": {} }),
        ));
        assert!(matches!(result, Err(BillingError::MalformedEvent(_, _))));
    }

    #[test]
    fn test_invoice_events() {
        assert_eq!(
            classify(&event("invoice.paid", json!({ "subscription": "sub_9" }))).unwrap(),
            BillingAction::PaymentSucceeded {
                subscription_id: "sub_9".to_string()
            }
        );
        assert_eq!(
            classify(&event("invoice.payment_failed", json!({ "subscription": "sub_9" }))).unwrap(),
            BillingAction::PaymentFailed {
                subscription_id: "sub_9".to_string()
            }
        );
        assert!(classify(&event("invoice.payment_failed", json!({}))).is_err());
    }

    #[test]
    fn test_subscription_deleted_uses_object_id() {
        assert_eq!(
            classify(&event(
                "customer.subscription.deleted",
                json!({ "id": "sub_4", "metadata": {} })
            ))
            .unwrap(),
            BillingAction::SubscriptionCancelled {
                subscription_id: "sub_4".to_string(),
                member_id: None,
            }
        );
    }

    #[test]
    fn test_unhandled_event_ignored() {
        assert_eq!(
            classify(&event("customer.created", json!({ "id": "cus_1" }))).unwrap(),
            BillingAction::Ignored
        );
    }
}
