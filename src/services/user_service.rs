// ==================== USER DIRECTORY ====================
// CRUD and authorization checks over the users collection. Uniqueness of
// email/username is enforced by pre-insert lookups (the response contract
// the dashboard expects) with unique indexes behind them.

use crate::{
    database::{MongoDB, USERS_COLLECTION},
    models::{User, ROLE_ADMIN},
    services::firebase_service::FirebaseAuth,
};
use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== REQUEST/RESPONSE MODELS ====================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterUserRequest {
    pub email: String,
    pub username: String,
    pub name: String,
    pub age: String,
    pub gender: String,
    pub country: String,
    pub device: String,
    /// Only used to provision the provider identity; never stored locally.
    pub password: Option<String>,
}

impl RegisterUserRequest {
    fn into_user(self) -> User {
        User {
            _id: None,
            email: self.email,
            username: self.username,
            name: self.name,
            age: self.age,
            gender: self.gender,
            country: self.country,
            device: self.device,
            role: None,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateUserRequest {
    pub email: String,
    pub username: String,
    pub name: String,
    pub age: String,
    pub gender: String,
    pub country: String,
    pub device: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PromoteAdminRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListUsersQuery {
    pub page: Option<u64>,
    pub size: Option<u64>,
    pub property: Option<String>,
    pub order: Option<String>,
}

// Write results keep the field names the dashboard already consumes
// (the MongoDB driver result shape).

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InsertReply {
    pub acknowledged: bool,
    #[serde(rename = "insertedId")]
    pub inserted_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UpdateReply {
    pub acknowledged: bool,
    #[serde(rename = "matchedCount")]
    pub matched_count: u64,
    #[serde(rename = "modifiedCount")]
    pub modified_count: u64,
    #[serde(rename = "upsertedId", skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteReply {
    pub acknowledged: bool,
    #[serde(rename = "deletedCount")]
    pub deleted_count: u64,
}

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(InsertReply),
    EmailTaken,
    UsernameTaken,
}

#[derive(Debug)]
pub enum UpdateUserOutcome {
    Updated(UpdateReply),
    UsernameTaken,
}

#[derive(Debug)]
pub enum PromoteOutcome {
    Promoted(UpdateReply),
    AlreadyAdmin,
    NotFound,
}

// ==================== SERVICE FUNCTIONS ====================

/// POST /users - self-registration, local record only.
pub async fn create_user(
    db: &MongoDB,
    request: RegisterUserRequest,
) -> Result<CreateUserOutcome, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let existing = users
        .find_one(doc! { "email": &request.email })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    if existing.is_some() {
        return Ok(CreateUserOutcome::EmailTaken);
    }

    let username_holder = users
        .find_one(doc! { "username": &request.username })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    if username_holder.is_some() {
        return Ok(CreateUserOutcome::UsernameTaken);
    }

    insert_user(db, request.into_user()).await
}

/// POST /users/addAnotherUser - admin-initiated creation; also provisions
/// the identity in the auth provider (fire-and-forget).
pub async fn create_user_by_admin(
    db: &MongoDB,
    firebase: &FirebaseAuth,
    request: RegisterUserRequest,
) -> Result<CreateUserOutcome, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let existing = users
        .find_one(doc! { "email": &request.email })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    if existing.is_some() {
        return Ok(CreateUserOutcome::EmailTaken);
    }

    let username_holder = users
        .find_one(doc! { "username": &request.username })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    if username_holder.is_some() {
        return Ok(CreateUserOutcome::UsernameTaken);
    }

    let password = request
        .password
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    firebase.mirror_create(request.email.clone(), password, request.name.clone());

    insert_user(db, request.into_user()).await
}

async fn insert_user(db: &MongoDB, user: User) -> Result<CreateUserOutcome, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let result = users
        .insert_one(&user)
        .await
        .map_err(|e| format!("Failed to insert user: {}", e))?;

    let inserted_id = result
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .unwrap_or_default();

    Ok(CreateUserOutcome::Created(InsertReply {
        acknowledged: true,
        inserted_id,
    }))
}

/// PUT /users/update/{id} - upserts the mutable profile fields. Proceeds
/// when the target username is the record's own or is held by nobody.
pub async fn update_user(
    db: &MongoDB,
    firebase: &FirebaseAuth,
    id: &str,
    request: UpdateUserRequest,
) -> Result<UpdateUserOutcome, String> {
    let oid = ObjectId::parse_str(id).map_err(|e| format!("Invalid user id: {}", e))?;
    let users = db.collection::<User>(USERS_COLLECTION);

    let filter = doc! { "_id": oid };
    let existing = users
        .find_one(filter.clone())
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    let username_holder = users
        .find_one(doc! { "username": &request.username })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    // Self-match exception: a record may keep its own username even
    // though the uniqueness lookup finds it.
    let keeps_own_username = existing
        .as_ref()
        .map(|u| u.username == request.username)
        .unwrap_or(false);

    if !keeps_own_username && username_holder.is_some() {
        return Ok(UpdateUserOutcome::UsernameTaken);
    }

    if let Some(existing) = &existing {
        firebase.mirror_update(
            existing.email.clone(),
            request.email.clone(),
            request.name.clone(),
        );
    }

    let update = doc! {
        "$set": {
            "email": &request.email,
            "username": &request.username,
            "name": &request.name,
            "age": &request.age,
            "gender": &request.gender,
            "country": &request.country,
            "device": &request.device,
        }
    };

    let result = users
        .update_one(filter, update)
        .upsert(true)
        .await
        .map_err(|e| format!("Failed to update user: {}", e))?;

    Ok(UpdateUserOutcome::Updated(UpdateReply {
        acknowledged: true,
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_id: result
            .upserted_id
            .as_ref()
            .and_then(|id| id.as_object_id())
            .map(|id| id.to_hex()),
    }))
}

/// DELETE /users/delete/{id} - mirrors the deletion to the auth provider
/// independently of the local result.
pub async fn delete_user(
    db: &MongoDB,
    firebase: &FirebaseAuth,
    id: &str,
) -> Result<DeleteReply, String> {
    let oid = ObjectId::parse_str(id).map_err(|e| format!("Invalid user id: {}", e))?;
    let users = db.collection::<User>(USERS_COLLECTION);

    let existing = users
        .find_one(doc! { "_id": oid })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    if let Some(user) = existing {
        firebase.mirror_delete(user.email);
    }

    let result = users
        .delete_one(doc! { "_id": oid })
        .await
        .map_err(|e| format!("Failed to delete user: {}", e))?;

    Ok(DeleteReply {
        acknowledged: true,
        deleted_count: result.deleted_count,
    })
}

/// GET /users/{id}
pub async fn get_user(db: &MongoDB, id: &str) -> Result<Option<User>, String> {
    let oid = ObjectId::parse_str(id).map_err(|e| format!("Invalid user id: {}", e))?;
    let users = db.collection::<User>(USERS_COLLECTION);

    users
        .find_one(doc! { "_id": oid })
        .await
        .map_err(|e| format!("Database error: {}", e))
}

/// GET /users - dashboard listing. Every record carrying a role field is
/// excluded, whatever its value.
pub async fn list_users(db: &MongoDB, query: &ListUsersQuery) -> Result<Vec<User>, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let mut find = users.find(doc! { "role": { "$exists": false } });

    if let Some(property) = &query.property {
        let mut sort = mongodb::bson::Document::new();
        sort.insert(property.clone(), sort_direction(query.order.as_deref()));
        find = find.sort(sort);
    }

    if let Some(page) = query.page {
        let size = query.size.unwrap_or(10);
        find = find.skip(list_offset(page, size)).limit(size as i64);
    }

    let mut cursor = find.await.map_err(|e| format!("Database error: {}", e))?;

    let mut result = Vec::new();
    while let Some(user) = cursor.next().await {
        match user {
            Ok(user) => result.push(user),
            Err(e) => log::error!("Error reading user record: {}", e),
        }
    }

    Ok(result)
}

/// GET /users/checkAdmin/{email} - false for unknown emails.
pub async fn check_admin(db: &MongoDB, email: &str) -> Result<bool, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let user = users
        .find_one(doc! { "email": email })
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    Ok(user.map(|u| u.is_admin()).unwrap_or(false))
}

/// PUT /users/admin - grants the admin role unless the target already
/// holds any role.
pub async fn promote_to_admin(db: &MongoDB, email: &str) -> Result<PromoteOutcome, String> {
    let users = db.collection::<User>(USERS_COLLECTION);

    let filter = doc! { "email": email };
    let existing = users
        .find_one(filter.clone())
        .await
        .map_err(|e| format!("Database error: {}", e))?;

    let existing = match existing {
        Some(user) => user,
        None => return Ok(PromoteOutcome::NotFound),
    };

    if existing.role.is_some() {
        return Ok(PromoteOutcome::AlreadyAdmin);
    }

    let result = users
        .update_one(filter, doc! { "$set": { "role": ROLE_ADMIN } })
        .await
        .map_err(|e| format!("Failed to update user: {}", e))?;

    Ok(PromoteOutcome::Promoted(UpdateReply {
        acknowledged: true,
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_id: None,
    }))
}

// Both values come straight from the query string; the offset must not
// overflow.
fn list_offset(page: u64, size: u64) -> u64 {
    page.saturating_mul(size)
}

fn sort_direction(order: Option<&str>) -> i32 {
    match order {
        Some("desc") | Some("descending") | Some("-1") => -1,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, username: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            email: email.to_string(),
            username: username.to_string(),
            name: "Test User".to_string(),
            age: "28".to_string(),
            gender: "other".to_string(),
            country: "Portugal".to_string(),
            device: "web".to_string(),
            password: None,
        }
    }

    fn unique(tag: &str) -> String {
        format!("{}-{}", tag, Uuid::new_v4().simple())
    }

    async fn test_db() -> MongoDB {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/user_dashboard_test".to_string());
        MongoDB::new(&uri).await.expect("MongoDB must be running")
    }

    fn test_firebase() -> FirebaseAuth {
        FirebaseAuth::new("test-project", "test-key")
    }

    #[test]
    fn pagination_offset_saturates_instead_of_overflowing() {
        assert_eq!(list_offset(0, 10), 0);
        assert_eq!(list_offset(3, 10), 30);
        assert_eq!(list_offset(u64::MAX, 10), u64::MAX);
        assert_eq!(list_offset(u64::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn sort_direction_maps_order_strings() {
        assert_eq!(sort_direction(Some("desc")), -1);
        assert_eq!(sort_direction(Some("descending")), -1);
        assert_eq!(sort_direction(Some("asc")), 1);
        assert_eq!(sort_direction(Some("garbage")), 1);
        assert_eq!(sort_direction(None), 1);
    }

    #[test]
    fn registration_payload_never_persists_password_or_role() {
        let mut req = request("kate@example.com", "kate");
        req.password = Some("hunter2".to_string());

        let user = req.into_user();
        assert!(user.role.is_none());

        let doc = mongodb::bson::to_document(&user).unwrap();
        assert!(!doc.contains_key("password"));
        assert!(!doc.contains_key("role"));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn second_registration_with_same_email_conflicts() {
        let db = test_db().await;
        let email = format!("{}@example.com", unique("dup-email"));

        let first = create_user(&db, request(&email, &unique("un"))).await.unwrap();
        assert!(matches!(first, CreateUserOutcome::Created(_)));

        let second = create_user(&db, request(&email, &unique("un"))).await.unwrap();
        assert!(matches!(second, CreateUserOutcome::EmailTaken));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn second_registration_with_same_username_conflicts() {
        let db = test_db().await;
        let username = unique("dup-un");

        let first = create_user(
            &db,
            request(&format!("{}@example.com", unique("a")), &username),
        )
        .await
        .unwrap();
        assert!(matches!(first, CreateUserOutcome::Created(_)));

        let second = create_user(
            &db,
            request(&format!("{}@example.com", unique("b")), &username),
        )
        .await
        .unwrap();
        assert!(matches!(second, CreateUserOutcome::UsernameTaken));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn listing_excludes_every_role_holder() {
        let db = test_db().await;

        let plain = request(&format!("{}@example.com", unique("list")), &unique("list"));
        let plain_email = plain.email.clone();
        create_user(&db, plain).await.unwrap();

        let flagged = request(&format!("{}@example.com", unique("mod")), &unique("mod"));
        let flagged_email = flagged.email.clone();
        create_user(&db, flagged).await.unwrap();
        promote_to_admin(&db, &flagged_email).await.unwrap();

        let listed = list_users(
            &db,
            &ListUsersQuery {
                page: None,
                size: None,
                property: None,
                order: None,
            },
        )
        .await
        .unwrap();

        assert!(listed.iter().any(|u| u.email == plain_email));
        assert!(listed.iter().all(|u| u.email != flagged_email));
        assert!(listed.iter().all(|u| u.role.is_none()));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn promoting_twice_reports_already_admin() {
        let db = test_db().await;
        let email = format!("{}@example.com", unique("admin"));
        create_user(&db, request(&email, &unique("admin"))).await.unwrap();

        let first = promote_to_admin(&db, &email).await.unwrap();
        assert!(matches!(first, PromoteOutcome::Promoted(_)));
        assert!(check_admin(&db, &email).await.unwrap());

        let second = promote_to_admin(&db, &email).await.unwrap();
        assert!(matches!(second, PromoteOutcome::AlreadyAdmin));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn check_admin_is_false_for_unknown_email() {
        let db = test_db().await;
        let admin = check_admin(&db, &format!("{}@example.com", unique("ghost")))
            .await
            .unwrap();
        assert!(!admin);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn update_rejects_username_held_by_another_record() {
        let db = test_db().await;
        let firebase = test_firebase();

        let holder_username = unique("held");
        create_user(
            &db,
            request(&format!("{}@example.com", unique("holder")), &holder_username),
        )
        .await
        .unwrap();

        let victim = request(&format!("{}@example.com", unique("victim")), &unique("victim"));
        let victim_email = victim.email.clone();
        let created = create_user(&db, victim).await.unwrap();
        let victim_id = match created {
            CreateUserOutcome::Created(reply) => reply.inserted_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let outcome = update_user(
            &db,
            &firebase,
            &victim_id,
            UpdateUserRequest {
                email: victim_email.clone(),
                username: holder_username,
                name: "Renamed".to_string(),
                age: "28".to_string(),
                gender: "other".to_string(),
                country: "Portugal".to_string(),
                device: "web".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(outcome, UpdateUserOutcome::UsernameTaken));

        // Unchanged on conflict
        let unchanged = get_user(&db, &victim_id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, victim_email);
        assert_ne!(unchanged.name, "Renamed");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn update_accepts_records_own_username() {
        let db = test_db().await;
        let firebase = test_firebase();

        let username = unique("self");
        let payload = request(&format!("{}@example.com", unique("self")), &username);
        let email = payload.email.clone();
        let created = create_user(&db, payload).await.unwrap();
        let id = match created {
            CreateUserOutcome::Created(reply) => reply.inserted_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let outcome = update_user(
            &db,
            &firebase,
            &id,
            UpdateUserRequest {
                email,
                username,
                name: "Renamed".to_string(),
                age: "29".to_string(),
                gender: "other".to_string(),
                country: "Spain".to_string(),
                device: "ios".to_string(),
            },
        )
        .await
        .unwrap();

        match outcome {
            UpdateUserOutcome::Updated(reply) => assert_eq!(reply.matched_count, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let updated = get_user(&db, &id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.country, "Spain");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn delete_removes_the_record() {
        let db = test_db().await;
        let firebase = test_firebase();

        let created = create_user(
            &db,
            request(&format!("{}@example.com", unique("del")), &unique("del")),
        )
        .await
        .unwrap();
        let id = match created {
            CreateUserOutcome::Created(reply) => reply.inserted_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let reply = delete_user(&db, &firebase, &id).await.unwrap();
        assert_eq!(reply.deleted_count, 1);
        assert!(get_user(&db, &id).await.unwrap().is_none());
    }
}
