//! Behaviour that depends on database constraints and transactions. Each
//! test gets a fresh database with the migrations applied.

use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use dojo::models::{
    belt_history::MemberBeltHistory,
    check_in::{CheckIn, CheckInMethod, CreateCheckInData},
    family_account::FamilyAccount,
    gym_class::{CreateClassData, GymClass},
    member::{Member, MemberStatus},
    waiver::Waiver,
};
use dojo::services::{
    belts::PromotionKind,
    billing::{self, WebhookOutcome},
    check_in::{self, CheckInError},
    enrollment::{self, EnrollmentContext, EnrollmentError, FamilyMemberSignup, SignupRequest, WaiverSignature},
    promotions::{self, PromotionRequest},
    stripe::WebhookEvent,
    waivers::SignerRelationship,
};

fn ctx() -> EnrollmentContext<'static> {
    EnrollmentContext {
        stripe: None,
        email: None,
        base_url: "http://localhost:3000",
        gym_name: "Test Dojo",
    }
}

fn waiver(relationship: SignerRelationship) -> WaiverSignature {
    WaiverSignature {
        signer_name: "Lucia Ramos".to_string(),
        relationship,
        signer_email: None,
        signature_text: "Lucia Ramos".to_string(),
        agreed: true,
    }
}

fn signup(email: &str) -> SignupRequest {
    SignupRequest {
        first_name: "Lucia".to_string(),
        last_name: "Ramos".to_string(),
        email: email.to_string(),
        phone: Some("555-0100".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1988, 2, 3).unwrap(),
        program: "adult_bjj".to_string(),
        emergency_contact_name: None,
        emergency_contact_phone: None,
        waiver: waiver(SignerRelationship::SelfSigned),
        family_members: vec![],
    }
}

fn family_signup(email: &str) -> SignupRequest {
    let mut request = signup(email);
    request.family_members.push(FamilyMemberSignup {
        first_name: "Tomas".to_string(),
        last_name: "Ramos".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2016, 5, 1).unwrap(),
        program: "kids_bjj".to_string(),
        waiver: waiver(SignerRelationship::Parent),
    });
    request
}

async fn enroll_active(pool: &PgPool, email: &str) -> Member {
    let result = enrollment::enroll(pool, &ctx(), signup(email)).await.unwrap();
    let member = result.members.into_iter().next().unwrap();
    Member::set_status(pool, member.id, MemberStatus::Active)
        .await
        .unwrap();
    Member::find_by_id(pool, member.id).await.unwrap().unwrap()
}

async fn current_rows(pool: &PgPool, member_id: Uuid) -> Vec<MemberBeltHistory> {
    MemberBeltHistory::list_by_member(pool, member_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.is_current)
        .collect()
}

fn webhook_event(id: &str, event_type: &str, object: serde_json::Value) -> WebhookEvent {
    serde_json::from_value(json!({
        "id": id,
        "type": event_type,
        "data": { "object": object }
    }))
    .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn test_family_enrollment_creates_waivers_belts_and_rate(pool: PgPool) {
    let result = enrollment::enroll(&pool, &ctx(), family_signup("ramos@example.com"))
        .await
        .unwrap();

    assert_eq!(result.members.len(), 2);
    assert_eq!(result.price.monthly_total, 150);
    assert!(result.checkout_url.is_none());

    let account = result.family_account.unwrap();
    let stored = FamilyAccount::find_by_id(&pool, account.id).await.unwrap().unwrap();
    assert_eq!(stored.monthly_rate, 150);
    assert_eq!(stored.primary_member_id, Some(result.members[0].id));

    for member in &result.members {
        assert_eq!(member.status(), MemberStatus::Pending);
        assert_eq!(member.family_account_id, Some(account.id));

        let waivers = Waiver::list_by_member(&pool, member.id).await.unwrap();
        assert_eq!(waivers.len(), 1);

        let current = current_rows(&pool, member.id).await;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].belt, "white");
        assert_eq!(current[0].stripes, 0);
    }

    let kid_waiver = Waiver::find_latest_for_member(&pool, result.members[1].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kid_waiver.relationship(), SignerRelationship::Parent);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_email_rejected_once_active(pool: PgPool) {
    enroll_active(&pool, "taken@example.com").await;

    let result = enrollment::enroll(&pool, &ctx(), signup("TAKEN@example.com")).await;
    assert!(matches!(result, Err(EnrollmentError::DuplicateEmail)));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_pending_signup_retry_resumes_existing_rows(pool: PgPool) {
    let first = enrollment::enroll(&pool, &ctx(), family_signup("retry@example.com"))
        .await
        .unwrap();

    let retry = enrollment::enroll(&pool, &ctx(), family_signup("retry@example.com"))
        .await
        .unwrap();

    let first_ids: Vec<_> = first.members.iter().map(|m| m.id).collect();
    let retry_ids: Vec<_> = retry.members.iter().map(|m| m.id).collect();
    assert_eq!(first_ids, retry_ids);
    assert_eq!(retry.price.monthly_total, 150);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_account_holder_email_is_unique_in_database(pool: PgPool) {
    let member = enroll_active(&pool, "solo@example.com").await;

    let insert = sqlx::query(
        r#"
        INSERT INTO members (
            first_name, last_name, email, date_of_birth, program, member_type,
            check_in_pin, qr_token
        )
        VALUES ('Other', 'Person', 'Solo@Example.com', '1990-01-01', 'adult_bjj', 'adult', 'manual-pin', 'other-token')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap_err();

    assert!(dojo::db::is_unique_violation(
        &insert,
        "members_account_holder_email_idx"
    ));
    assert!(Member::find_primary_by_email(&pool, "SOLO@example.com")
        .await
        .unwrap()
        .is_some_and(|m| m.id == member.id));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_promotions_keep_one_current_rank(pool: PgPool) {
    let member = enroll_active(&pool, "promo@example.com").await;

    let stripe = PromotionRequest {
        kind: PromotionKind::Stripe,
        belt: None,
        promoted_by: Some("Coach Ana".to_string()),
        notes: None,
    };
    promotions::promote(&pool, None, "Test Dojo", &member, stripe)
        .await
        .unwrap();

    let member = Member::find_by_id(&pool, member.id).await.unwrap().unwrap();
    assert_eq!(member.current_stripes, 1);

    let belt = PromotionRequest {
        kind: PromotionKind::Belt,
        belt: Some("blue".to_string()),
        promoted_by: Some("Coach Ana".to_string()),
        notes: Some("Early promotion".to_string()),
    };
    let entry = promotions::promote(&pool, None, "Test Dojo", &member, belt)
        .await
        .unwrap();
    assert_eq!(entry.belt, "blue");
    assert_eq!(entry.stripes, 0);

    let current = current_rows(&pool, member.id).await;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, entry.id);

    let history = MemberBeltHistory::list_by_member(&pool, member.id).await.unwrap();
    assert_eq!(history.len(), 3);

    let member = Member::find_by_id(&pool, member.id).await.unwrap().unwrap();
    assert_eq!(member.current_belt, "blue");
    assert_eq!(member.current_stripes, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_webhook_redelivery_is_duplicate(pool: PgPool) {
    let result = enrollment::enroll(&pool, &ctx(), signup("hook@example.com"))
        .await
        .unwrap();
    let member_id = result.members[0].id;

    let event = webhook_event(
        "evt_checkout_1",
        "checkout.session.completed",
        json!({
            "customer": "cus_1",
            "subscription": "sub_1",
            "metadata": { "member_id": member_id.to_string() }
        }),
    );

    assert_eq!(
        billing::apply_webhook_event(&pool, &event).await.unwrap(),
        WebhookOutcome::Applied { members_updated: 1 }
    );
    assert_eq!(
        billing::apply_webhook_event(&pool, &event).await.unwrap(),
        WebhookOutcome::Duplicate
    );

    let member = Member::find_by_id(&pool, member_id).await.unwrap().unwrap();
    assert_eq!(member.status(), MemberStatus::Active);
    assert_eq!(member.stripe_subscription_id.as_deref(), Some("sub_1"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_failed_webhook_is_forgotten_for_retry(pool: PgPool) {
    let result = enrollment::enroll(&pool, &ctx(), signup("retry-hook@example.com"))
        .await
        .unwrap();
    let member_id = result.members[0].id;

    let event = webhook_event(
        "evt_checkout_2",
        "checkout.session.completed",
        json!({
            "customer": "cus_2",
            "subscription": "sub_2",
            "metadata": { "member_id": member_id.to_string() }
        }),
    );

    // Make the activation write fail
    sqlx::query("ALTER TABLE members ADD CONSTRAINT block_activation CHECK (status <> 'active') NOT VALID")
        .execute(&pool)
        .await
        .unwrap();
    assert!(billing::apply_webhook_event(&pool, &event).await.is_err());

    let recorded: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM webhook_events WHERE id = $1)")
            .bind(&event.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!recorded);

    sqlx::query("ALTER TABLE members DROP CONSTRAINT block_activation")
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(
        billing::apply_webhook_event(&pool, &event).await.unwrap(),
        WebhookOutcome::Applied { members_updated: 1 }
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_same_day_check_in_conflicts(pool: PgPool) {
    let member = enroll_active(&pool, "mat@example.com").await;
    let today = Utc::now().date_naive();

    check_in::record_check_in(&pool, &member, None, CheckInMethod::Pin, today)
        .await
        .unwrap();

    let again = check_in::record_check_in(&pool, &member, None, CheckInMethod::Qr, today).await;
    assert!(matches!(again, Err(CheckInError::AlreadyCheckedIn)));

    // The index backs up the read-side check
    let raw = CheckIn::create(
        &pool,
        CreateCheckInData {
            member_id: member.id,
            class_id: None,
            check_in_date: today,
            method: CheckInMethod::Admin,
        },
    )
    .await
    .unwrap_err();
    assert!(dojo::db::is_unique_violation(
        &raw,
        "check_ins_member_class_day_idx"
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_full_class_rejects_check_in(pool: PgPool) {
    let first = enroll_active(&pool, "first@example.com").await;
    let second = enroll_active(&pool, "second@example.com").await;
    let today = Utc::now().date_naive();

    let class = GymClass::create(
        &pool,
        CreateClassData {
            name: "Competition team".to_string(),
            program: "adult_bjj".to_string(),
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            duration_minutes: 60,
            capacity: Some(1),
            min_age: None,
            max_age: None,
            instructor: None,
        },
    )
    .await
    .unwrap();

    check_in::record_check_in(&pool, &first, Some(class.id), CheckInMethod::Pin, today)
        .await
        .unwrap();

    let full = check_in::record_check_in(&pool, &second, Some(class.id), CheckInMethod::Pin, today).await;
    assert!(matches!(full, Err(CheckInError::ClassFull)));

    // Open mat is not capped
    check_in::record_check_in(&pool, &second, None, CheckInMethod::Pin, today)
        .await
        .unwrap();
}
