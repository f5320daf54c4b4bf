//! Runs against a real PostgreSQL when `DATABASE_URL` is set; skipped otherwise.

use chrono::{Duration, NaiveDate, Utc};
use relief_portal::{
    auth::hash_password,
    config::OtpPolicy,
    error::AppError,
    models::{
        CatalogKind, CatalogPayload, NewOtp, NewServiceRequest, NewUser, OtpPurpose,
        RequestStatus, RequestTransition, Urgency, UserRole,
    },
    repository::{PostgresRepository, Repository},
    workflow::parse_request_number,
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

async fn setup() -> Option<PostgresRepository> {
    dotenv::dotenv().ok();
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres tests");
        return None;
    };

    let pool = PgPool::connect(&db_url)
        .await
        .expect("Failed to connect to database for integration tests.");
    let repo = PostgresRepository::new(pool);
    repo.migrate().await.expect("Failed to run database migrations.");
    Some(repo)
}

// --- Test Data Helpers ---

/// Unique contact details so repeated runs against one database don't collide.
fn unique_contact() -> (String, String) {
    let tag = Uuid::new_v4().simple().to_string();
    let digits: String = tag
        .bytes()
        .filter(u8::is_ascii_digit)
        .chain(std::iter::repeat(b'0'))
        .take(9)
        .map(char::from)
        .collect();
    (format!("{}@relief.test", &tag[..12]), format!("+919{}", digits))
}

fn new_user(email: &str, phone: &str) -> NewUser {
    NewUser {
        name: "Integration User".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        password_hash: hash_password("relief-pass-2024").unwrap(),
        role: UserRole::Citizen,
    }
}

async fn create_service(repo: &PostgresRepository) -> Uuid {
    let entry = repo
        .create_catalog_entry(
            CatalogKind::Services,
            CatalogPayload {
                name: format!("Service {}", Uuid::new_v4()),
                description: None,
                is_active: true,
            },
        )
        .await
        .expect("create service");
    entry.id
}

fn plea(service_id: Uuid) -> NewServiceRequest {
    NewServiceRequest {
        citizen_id: None,
        name: "Lakshmi".to_string(),
        phone: "+919876543210".to_string(),
        service_id,
        alert_category_id: None,
        description: None,
        people_count: 3,
        village_id: None,
        address: Some("Relief camp".to_string()),
        urgency: Urgency::High,
    }
}

// --- Tests ---

#[tokio::test]
async fn test_user_contact_details_are_unique() {
    let Some(repo) = setup().await else { return };
    let (email, phone) = unique_contact();

    let user = repo.create_user(new_user(&email, &phone)).await.unwrap();
    let found = repo.find_user_by_phone(&phone).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    let (_, other_phone) = unique_contact();
    let duplicate = repo.create_user(new_user(&email, &other_phone)).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))), "{:?}", duplicate);
}

#[tokio::test]
async fn test_request_numbers_follow_on_within_a_day() {
    let Some(repo) = setup().await else { return };
    let service_id = create_service(&repo).await;
    let day = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();

    let first = repo.create_service_request(plea(service_id), day).await.unwrap();
    let second = repo.create_service_request(plea(service_id), day).await.unwrap();

    let (first_day, first_seq) = parse_request_number(&first.request_number).unwrap();
    let (_, second_seq) = parse_request_number(&second.request_number).unwrap();
    assert_eq!(first_day, day);
    assert_eq!(second_seq, first_seq + 1);
    assert_eq!(first.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_stale_transitions_are_refused() {
    let Some(repo) = setup().await else { return };
    let service_id = create_service(&repo).await;
    let day = NaiveDate::from_ymd_opt(2001, 1, 2).unwrap();
    let request = repo.create_service_request(plea(service_id), day).await.unwrap();

    let cancel = || RequestTransition {
        from: RequestStatus::Pending,
        to: RequestStatus::Cancelled,
        assigned_group: None,
        note: None,
    };
    let moved = repo
        .transition_service_request(request.id, cancel())
        .await
        .unwrap()
        .expect("first move wins");
    assert_eq!(moved.status, RequestStatus::Cancelled);

    // The row is no longer pending, so the same move loses.
    let stale = repo.transition_service_request(request.id, cancel()).await.unwrap();
    assert!(stale.is_none());
}

#[tokio::test]
async fn test_otp_budget_and_cooldown_hold_in_the_database() {
    let Some(repo) = setup().await else { return };
    let (_, phone) = unique_contact();
    let policy = OtpPolicy::default();
    let now = Utc::now();
    let new_otp = || NewOtp {
        phone: phone.clone(),
        purpose: OtpPurpose::PhoneVerification,
        code_hash: "not-a-real-hash".to_string(),
        expires_at: now + Duration::seconds(policy.ttl_secs),
    };

    let issued = repo.issue_otp(new_otp(), &policy, now).await.unwrap();
    let again = repo.issue_otp(new_otp(), &policy, now).await;
    assert!(matches!(again, Err(AppError::TooManyRequests { .. })), "{:?}", again);

    for expected in 1..=policy.max_attempts {
        let spent = repo.reserve_otp_attempt(issued.id, policy.max_attempts).await.unwrap();
        assert_eq!(spent, Some(expected));
    }
    let exhausted = repo.reserve_otp_attempt(issued.id, policy.max_attempts).await.unwrap();
    assert!(exhausted.is_none());
}
