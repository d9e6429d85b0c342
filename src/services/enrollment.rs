use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use url::Url;

use crate::db;
use crate::models::{
    belt_history::{MemberBeltHistory, RecordPromotionData},
    family_account::FamilyAccount,
    member::{CreateMemberData, Member, MemberStatus, MemberType},
    waiver::{CreateWaiverData, Waiver},
};
use crate::services::{
    credentials::{self, CredentialError},
    email::{self, EmailClient, WelcomeEmail},
    pricing::{self, FamilyPrice},
    qr_generator,
    stripe::{CheckoutRequest, StripeClient, StripeError},
    waivers::{self, SignerRelationship},
};

const MAX_PLAUSIBLE_AGE: i32 = 120;
const ACCOUNT_HOLDER_EMAIL_INDEX: &str = "members_account_holder_email_idx";

#[derive(thiserror::Error, Debug)]
pub enum EnrollmentError {
    #[error("{0}")]
    Validation(String),

    #[error("A member with this email is already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Credential generation failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Checkout creation failed: {0}")]
    Payment(#[from] StripeError),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaiverSignature {
    pub signer_name: String,
    pub relationship: SignerRelationship,
    pub signer_email: Option<String>,
    /// Typed full name acting as the signature
    pub signature_text: String,
    pub agreed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyMemberSignup {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub program: String,
    pub waiver: WaiverSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub program: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub waiver: WaiverSignature,
    #[serde(default)]
    pub family_members: Vec<FamilyMemberSignup>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentResult {
    pub members: Vec<Member>,
    pub family_account: Option<FamilyAccount>,
    pub price: FamilyPrice,
    pub checkout_url: Option<String>,
}

/// Collaborators for signup that may be absent in a given deployment
pub struct EnrollmentContext<'a> {
    pub stripe: Option<&'a StripeClient>,
    pub email: Option<&'a EmailClient>,
    pub base_url: &'a str,
    pub gym_name: &'a str,
}

fn require_non_empty(value: &str, field: &str) -> Result<(), EnrollmentError> {
    if value.trim().is_empty() {
        return Err(EnrollmentError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Checks one person's details and waiver, returning their age today
fn validate_person(
    first_name: &str,
    last_name: &str,
    date_of_birth: NaiveDate,
    program: &str,
    waiver: &WaiverSignature,
    today: NaiveDate,
) -> Result<i32, EnrollmentError> {
    require_non_empty(first_name, "First name")?;
    require_non_empty(last_name, "Last name")?;
    require_non_empty(program, "Program")?;

    if date_of_birth > today {
        return Err(EnrollmentError::Validation(
            "Date of birth cannot be in the future".to_string(),
        ));
    }
    let age = waivers::age_on(date_of_birth, today);
    if age > MAX_PLAUSIBLE_AGE {
        return Err(EnrollmentError::Validation(
            "Date of birth is not plausible".to_string(),
        ));
    }

    validate_waiver(waiver, age)?;

    Ok(age)
}

pub fn validate_waiver(waiver: &WaiverSignature, age: i32) -> Result<(), EnrollmentError> {
    if !waiver.agreed {
        return Err(EnrollmentError::Validation(
            "The liability waiver must be accepted".to_string(),
        ));
    }
    require_non_empty(&waiver.signer_name, "Signer name")?;
    require_non_empty(&waiver.signature_text, "Signature")?;
    waivers::validate_signer(waiver.relationship, age).map_err(EnrollmentError::Validation)
}

/// Validates a whole signup, returning the age of each person in order
/// (primary first)
pub fn validate_signup(request: &SignupRequest, today: NaiveDate) -> Result<Vec<i32>, EnrollmentError> {
    if !is_plausible_email(&request.email) {
        return Err(EnrollmentError::Validation(
            "A valid email address is required".to_string(),
        ));
    }

    let mut ages = vec![validate_person(
        &request.first_name,
        &request.last_name,
        request.date_of_birth,
        &request.program,
        &request.waiver,
        today,
    )?];

    for dependent in &request.family_members {
        ages.push(validate_person(
            &dependent.first_name,
            &dependent.last_name,
            dependent.date_of_birth,
            &dependent.program,
            &dependent.waiver,
            today,
        )?);
    }

    Ok(ages)
}

struct NewPerson<'a> {
    first_name: &'a str,
    last_name: &'a str,
    phone: Option<String>,
    date_of_birth: NaiveDate,
    program: &'a str,
    emergency_contact_name: Option<String>,
    emergency_contact_phone: Option<String>,
    waiver: &'a WaiverSignature,
    age: i32,
    is_account_holder: bool,
}

/// Creates the member row, their signed waiver and their initial white belt
async fn create_person(
    pool: &PgPool,
    email: &str,
    person: NewPerson<'_>,
    now: DateTime<Utc>,
) -> Result<Member, EnrollmentError> {
    let check_in_pin = credentials::generate_unique_pin(pool).await?;
    let qr_token = credentials::generate_qr_token().map_err(CredentialError::from)?;

    let member = Member::create(
        pool,
        CreateMemberData {
            first_name: person.first_name.trim().to_string(),
            last_name: person.last_name.trim().to_string(),
            email: email.trim().to_string(),
            phone: person.phone,
            date_of_birth: person.date_of_birth,
            program: person.program.trim().to_string(),
            member_type: MemberType::for_age(person.age),
            check_in_pin,
            qr_token,
            emergency_contact_name: person.emergency_contact_name,
            emergency_contact_phone: person.emergency_contact_phone,
            is_account_holder: person.is_account_holder,
        },
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e, ACCOUNT_HOLDER_EMAIL_INDEX) {
            EnrollmentError::DuplicateEmail
        } else {
            EnrollmentError::Database(e)
        }
    })?;

    Waiver::create(
        pool,
        CreateWaiverData {
            member_id: member.id,
            signer_name: person.waiver.signer_name.trim().to_string(),
            signer_relationship: person.waiver.relationship,
            signer_email: person.waiver.signer_email.clone(),
            signature_text: person.waiver.signature_text.trim().to_string(),
            member_age_at_signing: person.age,
            signed_at: now,
        },
    )
    .await?;

    MemberBeltHistory::record_promotion(
        pool,
        RecordPromotionData {
            member_id: member.id,
            belt: "white".to_string(),
            stripes: 0,
            promoted_by: None,
            days_since_last: None,
            classes_since_last: None,
            notes: Some("Enrolled".to_string()),
        },
    )
    .await?;

    tracing::info!(member_id = %member.id, member_type = %member.member_type, "Member enrolled");

    Ok(member)
}

/// Enrolls a member and any family members signing up with them.
///
/// Members start in `pending` and become active when the payment
/// processor reports a completed checkout.
#[tracing::instrument(skip(pool, ctx, request))]
pub async fn enroll(
    pool: &PgPool,
    ctx: &EnrollmentContext<'_>,
    request: SignupRequest,
) -> Result<EnrollmentResult, EnrollmentError> {
    let now = Utc::now();
    let ages = validate_signup(&request, now.date_naive())?;

    if let Some(existing) = Member::find_primary_by_email(pool, &request.email).await? {
        if !can_resume_signup(&existing, &request) {
            tracing::warn!("Signup rejected: email already registered");
            return Err(EnrollmentError::DuplicateEmail);
        }
        return resume_pending_signup(pool, ctx, existing).await;
    }

    let primary = create_person(
        pool,
        &request.email,
        NewPerson {
            first_name: &request.first_name,
            last_name: &request.last_name,
            phone: request.phone.clone(),
            date_of_birth: request.date_of_birth,
            program: &request.program,
            emergency_contact_name: request.emergency_contact_name.clone(),
            emergency_contact_phone: request.emergency_contact_phone.clone(),
            waiver: &request.waiver,
            age: ages[0],
            is_account_holder: true,
        },
        now,
    )
    .await?;

    let mut members = vec![primary.clone()];
    let mut family_account = None;

    if !request.family_members.is_empty() {
        let account = FamilyAccount::create(
            pool,
            &format!("{} Family", primary.last_name),
            primary.id,
        )
        .await?;
        Member::set_family(pool, primary.id, Some(account.id)).await?;

        for (dependent, age) in request.family_members.iter().zip(ages.iter().skip(1)) {
            let member = create_person(
                pool,
                &request.email,
                NewPerson {
                    first_name: &dependent.first_name,
                    last_name: &dependent.last_name,
                    phone: request.phone.clone(),
                    date_of_birth: dependent.date_of_birth,
                    program: &dependent.program,
                    emergency_contact_name: request.emergency_contact_name.clone(),
                    emergency_contact_phone: request.emergency_contact_phone.clone(),
                    waiver: &dependent.waiver,
                    age: *age,
                    is_account_holder: false,
                },
                now,
            )
            .await?;
            Member::set_family(pool, member.id, Some(account.id)).await?;
            members.push(member);
        }

        family_account = Some(account);
    }

    let member_types: Vec<MemberType> = members.iter().map(|m| m.member_type()).collect();
    let price = pricing::calculate_family_price(&member_types);

    if let Some(account) = family_account.as_mut() {
        FamilyAccount::update_rate(pool, account.id, price.monthly_total as i32).await?;
        account.monthly_rate = price.monthly_total as i32;
        for member in members.iter_mut() {
            member.family_account_id = Some(account.id);
        }
    }

    let checkout_url = start_checkout(ctx, &primary, family_account.as_ref(), &price).await?;

    let qr_data_uri = qr_generator::qr_png_data_uri(&primary.qr_token)
        .map_err(|e| tracing::warn!(error = %e, "QR image for welcome email failed"))
        .ok();
    email::send_best_effort(
        ctx.email,
        &primary.email,
        &format!("Welcome to {}", ctx.gym_name),
        &WelcomeEmail {
            gym_name: ctx.gym_name,
            first_name: &primary.first_name,
            check_in_pin: &primary.check_in_pin,
            qr_data_uri: qr_data_uri.as_deref(),
            monthly_total: price.monthly_total,
            checkout_url: checkout_url.as_deref(),
        },
    )
    .await;

    Ok(EnrollmentResult {
        members,
        family_account,
        price,
        checkout_url,
    })
}

/// Opens a payment checkout for the account holder when payments are configured
async fn start_checkout(
    ctx: &EnrollmentContext<'_>,
    primary: &Member,
    family_account: Option<&FamilyAccount>,
    price: &FamilyPrice,
) -> Result<Option<String>, EnrollmentError> {
    let Some(stripe) = ctx.stripe else {
        tracing::info!(member_id = %primary.id, "Stripe not configured, skipping checkout");
        return Ok(None);
    };

    let base = Url::parse(ctx.base_url)?;
    let session = stripe
        .create_checkout_session(&CheckoutRequest {
            member_id: primary.id,
            family_account_id: family_account.map(|a| a.id),
            customer_email: primary.email.clone(),
            description: membership_description(ctx.gym_name, price),
            monthly_amount_cents: price.monthly_total_cents(),
            success_url: base.join("signup/success")?.to_string(),
            cancel_url: base.join("signup")?.to_string(),
        })
        .await?;

    Ok(session.url)
}

/// A signup that never reached a completed checkout may be retried by the
/// same person; any other match on the email is a duplicate
pub fn can_resume_signup(existing: &Member, request: &SignupRequest) -> bool {
    existing.status() == MemberStatus::Pending && existing.date_of_birth == request.date_of_birth
}

/// Issues a fresh checkout for the rows a previous attempt left pending
async fn resume_pending_signup(
    pool: &PgPool,
    ctx: &EnrollmentContext<'_>,
    primary: Member,
) -> Result<EnrollmentResult, EnrollmentError> {
    let family_account = match primary.family_account_id {
        Some(id) => FamilyAccount::find_by_id(pool, id).await?,
        None => None,
    };
    let members = match &family_account {
        Some(account) => Member::list_by_family(pool, account.id).await?,
        None => vec![primary.clone()],
    };

    let member_types: Vec<MemberType> = members.iter().map(|m| m.member_type()).collect();
    let price = pricing::calculate_family_price(&member_types);

    tracing::info!(member_id = %primary.id, members = members.len(), "Resuming pending signup");

    let checkout_url = start_checkout(ctx, &primary, family_account.as_ref(), &price).await?;

    Ok(EnrollmentResult {
        members,
        family_account,
        price,
        checkout_url,
    })
}

fn membership_description(gym_name: &str, price: &FamilyPrice) -> String {
    if price.member_count > 1 {
        format!("{} family membership ({} members)", gym_name, price.member_count)
    } else {
        format!("{} membership", gym_name)
    }
}
