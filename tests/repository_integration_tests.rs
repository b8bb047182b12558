use applicant_portal::{
    models::{ApplicationStatus, NewApplication, NewComment, NewUser, Role, Token, User},
    repository::{PostgresRepository, RepoError, Repository},
    token::generate_token_value,
};
use chrono::{SubsecRound, TimeDelta, Utc};
use sqlx::PgPool;

// --- Test Context and Setup ---

/// Holds the pool of the database named by `DATABASE_URL`. Tests return early
/// when it is not set.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres repository test");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_test_user(repo: &PostgresRepository, role: Role) -> User {
    let email = format!("{}@test.example.com", generate_token_value().to_lowercase());
    repo.set_user(NewUser {
        email,
        first_name: "Test".to_string(),
        last_name: role.to_string(),
        password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
        created_at: Utc::now().trunc_subsecs(6),
        role,
    })
    .await
    .expect("Failed to insert test user")
}

fn new_application(user_id: i64) -> NewApplication {
    NewApplication {
        user_id,
        birthday: None,
        phone: "555".to_string(),
        nationality: String::new(),
        country: String::new(),
        city: "bobtown".to_string(),
        zip: String::new(),
        address: String::new(),
        address_extra: String::new(),
        survey_data: String::new(),
        gender: String::new(),
        education_level: 1,
        status: ApplicationStatus::Received,
        created_at: Utc::now(),
    }
}

// --- Tests ---

#[tokio::test]
async fn test_user_round_trip_and_unique_email() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();

    let user = create_test_user(&repo, Role::TrustedHelper).await;
    assert!(user.id > 0);

    let by_id = repo.get_user(user.id).await.unwrap();
    assert_eq!(by_id, user);
    let by_email = repo.get_user_by_email(&user.email).await.unwrap();
    assert_eq!(by_email.id, user.id);
    assert_eq!(by_email.role, Role::TrustedHelper);

    let duplicate = repo
        .set_user(NewUser {
            email: user.email.clone(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: user.password_hash.clone(),
            created_at: Utc::now(),
            role: Role::Applicant,
        })
        .await;
    assert!(matches!(duplicate, Err(RepoError::Conflict(_))));

    assert!(matches!(repo.get_user(-1).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn test_token_lifecycle() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let user = create_test_user(&repo, Role::Applicant).await;
    let now = Utc::now().trunc_subsecs(6);

    let live = Token {
        user_id: user.id,
        value: generate_token_value(),
        expires: now + TimeDelta::hours(1),
    };
    let stale = Token {
        user_id: user.id,
        value: generate_token_value(),
        expires: now - TimeDelta::seconds(1),
    };
    repo.set_token(&live).await.unwrap();
    repo.set_token(&stale).await.unwrap();
    assert!(matches!(repo.set_token(&live).await, Err(RepoError::Conflict(_))));

    assert_eq!(repo.get_token(&live.value).await.unwrap(), live);

    assert!(repo.del_expired_tokens(now).await.unwrap() >= 1);
    assert!(matches!(repo.get_token(&stale.value).await, Err(RepoError::NotFound)));

    repo.del_token(&live.value).await.unwrap();
    assert!(matches!(repo.del_token(&live.value).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn test_application_and_comments() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let applicant = create_test_user(&repo, Role::Applicant).await;
    let reviewer = create_test_user(&repo, Role::SubAdmin).await;

    let application = repo.set_application(new_application(applicant.id)).await.unwrap();
    assert_eq!(application.status, "received");
    assert_eq!(application.phone, "555");

    let again = repo.set_application(new_application(applicant.id)).await;
    assert!(matches!(again, Err(RepoError::Conflict(_))));

    assert_eq!(
        repo.get_application_of(applicant.id).await.unwrap().id,
        application.id
    );

    let updated = repo
        .update_application_status(application.id, "verified", Utc::now())
        .await
        .unwrap();
    assert_eq!(updated.status, "verified");
    let verified = repo.get_applications(Some("verified")).await.unwrap();
    assert!(verified.iter().any(|a| a.id == application.id));

    let comment = repo
        .set_comment(NewComment {
            application_id: application.id,
            user_id: reviewer.id,
            contents: "Looks complete".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let comments = repo.get_comments(application.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, comment.id);
    assert_eq!(comments[0].user_id, reviewer.id);
}
