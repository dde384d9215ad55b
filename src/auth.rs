use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{NewUser, User};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use tracing::{info, warn};

const CREDENTIALS_MESSAGE: &str = "incorrect credentials";

pub fn hash_password(plain: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| AppError::Internal(format!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Looks the account up by username, then by email, and checks the password.
///
/// Unknown user, inactive account and wrong password all surface the same
/// generic message so the response does not reveal which accounts exist;
/// the logs keep the distinction.
pub fn authenticate(db: &Database, username_or_email: &str, password: &str) -> AppResult<User> {
    let user = match db.user_by_username(username_or_email)? {
        Some(user) => Some(user),
        None => db.user_by_email(username_or_email)?,
    };

    let Some(user) = user else {
        warn!(login = username_or_email, "login attempt for unknown account");
        return Err(AppError::Auth(CREDENTIALS_MESSAGE.to_string()));
    };

    if !user.is_active {
        warn!(login = username_or_email, "login attempt for inactive account");
        return Err(AppError::Auth(CREDENTIALS_MESSAGE.to_string()));
    }

    if !verify_password(password, &user.password_hash) {
        warn!(login = username_or_email, "login attempt with wrong password");
        return Err(AppError::Auth(CREDENTIALS_MESSAGE.to_string()));
    }

    db.touch_last_login(user.id)?;
    info!(user_id = user.id, "user authenticated");
    Ok(user)
}

pub fn register(db: &Database, new_user: NewUser) -> AppResult<User> {
    if db.user_by_username(&new_user.username)?.is_some() {
        return Err(AppError::Precondition(
            "username is already in use".to_string(),
        ));
    }
    if db.user_by_email(&new_user.email)?.is_some() {
        return Err(AppError::Precondition("email is already in use".to_string()));
    }

    let hash = hash_password(&new_user.password)?;
    let user = db.insert_user(&new_user.username, &new_user.email, &hash, new_user.role)?;
    info!(user_id = user.id, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::{authenticate, hash_password, register, verify_password};
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{NewUser, Role};
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        (dir, db)
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: "s3cret!".to_string(),
            role: Role::Viewer,
        }
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("s3cret!").expect("hash");
        assert_ne!(hash, "s3cret!");
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret!", "not-a-hash"));
    }

    #[test]
    fn authenticate_works_by_username_or_email() {
        let (_dir, db) = test_db();
        register(&db, new_user("ana", "ana@example.com")).expect("register");

        let by_name = authenticate(&db, "ana", "s3cret!").expect("by username");
        assert_eq!(by_name.username, "ana");
        assert!(by_name.last_login.is_none());

        let by_email = authenticate(&db, "ana@example.com", "s3cret!").expect("by email");
        assert!(db
            .user_by_id(by_email.id)
            .expect("query")
            .expect("exists")
            .last_login
            .is_some());
    }

    #[test]
    fn failures_share_one_generic_message() {
        let (_dir, db) = test_db();
        let user = register(&db, new_user("ana", "ana@example.com")).expect("register");

        let unknown = authenticate(&db, "nobody", "s3cret!").expect_err("unknown");
        let wrong = authenticate(&db, "ana", "wrong").expect_err("wrong password");
        assert_eq!(unknown.to_string(), wrong.to_string());

        db.set_user_active(user.id, false).expect("deactivate");
        let inactive = authenticate(&db, "ana", "s3cret!").expect_err("inactive");
        assert_eq!(inactive.to_string(), wrong.to_string());
    }

    #[test]
    fn register_rejects_duplicates() {
        let (_dir, db) = test_db();
        register(&db, new_user("ana", "ana@example.com")).expect("register");

        let by_name = register(&db, new_user("ana", "other@example.com"));
        assert!(matches!(by_name, Err(AppError::Precondition(_))));

        let by_email = register(&db, new_user("other", "ana@example.com"));
        assert!(matches!(by_email, Err(AppError::Precondition(_))));
    }
}
