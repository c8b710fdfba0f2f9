use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use schoolbank_api::config::ApiConfig;
use schoolbank_api::context::IMPERSONATE_HEADER;
use std::sync::Arc;

use schoolbank_auth::{
    IMPERSONATION_KEY, Identity, InMemoryLocalStore, JwtClaims, LocalStore, Profile, Role, Session,
};
use schoolbank_core::{SchoolId, UserId};

const JWT_SECRET: &str = "test-secret";
const ROOT_EMAIL: &str = "root@school.test";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory store, bound to an ephemeral port.
        let config = ApiConfig {
            superadmin_email: Some(ROOT_EMAIL.to_string()),
            ..ApiConfig::in_memory(JWT_SECRET)
        };
        let app = schoolbank_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path)).bearer_auth(token)).await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token)).await
    }

    /// Superadmin token; the first request links the seeded placeholder.
    fn root(&self) -> String {
        mint_jwt("root-identity", ROOT_EMAIL)
    }

    async fn create_school(&self, name: &str) -> String {
        let (status, body) = self.post(&self.root(), "/schools", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Provision a staff member and return a token for them.
    async fn staff(&self, caller: &str, email: &str, role: &str, school: Option<&str>) -> String {
        let (status, body) = self
            .post(
                caller,
                "/admin/users",
                json!({
                    "email": email,
                    "password": "secret1",
                    "name": email.split('@').next().unwrap(),
                    "role": role,
                    "schoolId": school,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        mint_jwt(body["uid"].as_str().unwrap(), email)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: &str, email: &str) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(sub),
        email: email.to_string(),
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = srv.send(srv.client.get(srv.url("/whoami"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
    assert_eq!(body["retryable"], false);

    let (status, _) = srv.get("not-a-token", "/whoami").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_without_profile_is_denied() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get(&mint_jwt("stranger", "who@where.test"), "/whoami").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");
}

#[tokio::test]
async fn superadmin_placeholder_links_on_first_login() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get(&srv.root(), "/whoami").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["userId"], "root-identity");
    assert_eq!(body["role"], "superadmin");
    assert_eq!(body["schoolId"], Value::Null);
    assert_eq!(body["impersonating"], false);
}

#[tokio::test]
async fn award_redeem_and_reverse_over_http() {
    let srv = TestServer::spawn().await;
    let school = srv.create_school("Scuola Verdi").await;
    let admin = srv.staff(&srv.root(), "admin@verdi.test", "admin", Some(&school)).await;
    let teacher = srv.staff(&admin, "teacher@verdi.test", "teacher", None).await;

    let (status, class) = srv.post(&admin, "/classes", json!({ "name": "3B" })).await;
    assert_eq!(status, StatusCode::CREATED, "{class}");
    let (status, student) = srv
        .post(&admin, "/students", json!({ "name": "Anna", "classId": class["id"] }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{student}");
    assert_eq!(student["balance"], 0);
    let student_id = student["id"].as_str().unwrap().to_string();
    let (status, reward) = srv
        .post(&admin, "/rewards", json!({ "name": "Extra recess", "cost": 30 }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{reward}");

    let (status, given) = srv
        .post(
            &teacher,
            "/ledger/give",
            json!({ "studentId": student_id, "amount": 100, "reason": "homework" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{given}");
    assert_eq!(given["newBalance"], 100);
    assert_eq!(given["transaction"]["type"], "reward");
    let give_tx = given["transaction"]["id"].as_str().unwrap().to_string();

    let (status, request) = srv
        .post(
            &teacher,
            "/reward-requests",
            json!({ "studentId": student_id, "rewardId": reward["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "pending");
    let request_id = request["id"].as_str().unwrap().to_string();

    let approve_path = format!("/reward-requests/{request_id}/approve");
    let (status, approval) = srv.post(&teacher, &approve_path, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{approval}");
    assert_eq!(approval["redemption"]["newBalance"], 70);
    assert_eq!(approval["request"]["status"], "approved");

    let (status, body) = srv.post(&teacher, &approve_path, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_request_state");

    let (_, body) = srv.get(&teacher, &format!("/students/{student_id}")).await;
    assert_eq!(body["balance"], 70);

    let tx_path = format!("/transactions/{give_tx}");
    let (status, _) = srv.delete(&teacher, &tx_path).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reversal) = srv.delete(&admin, &tx_path).await;
    assert_eq!(status, StatusCode::OK, "{reversal}");
    assert_eq!(reversal["newBalance"], -30);

    let (_, log) = srv
        .get(&admin, &format!("/transactions?studentId={student_id}"))
        .await;
    let items = log["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["reason"], "Redeem: Extra recess");
}

#[tokio::test]
async fn class_award_reports_each_student() {
    let srv = TestServer::spawn().await;
    let school = srv.create_school("Scuola Verdi").await;
    let admin = srv.staff(&srv.root(), "admin@verdi.test", "admin", Some(&school)).await;

    let (_, class) = srv.post(&admin, "/classes", json!({ "name": "3B" })).await;
    for name in ["Alba", "Bruno"] {
        srv.post(&admin, "/students", json!({ "name": name, "classId": class["id"] }))
            .await;
    }
    srv.post(&admin, "/students", json!({ "name": "Elsewhere" })).await;

    let (status, report) = srv
        .post(
            &admin,
            "/ledger/give-class",
            json!({ "classId": class["id"], "amount": 5, "reason": "tidy room", "icon": "🧹" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["completed"].as_array().unwrap().len(), 2);
    assert_eq!(report["failed"], Value::Null);
    assert!(report["notAttempted"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_school_reads() {
    let srv = TestServer::spawn().await;
    let school_a = srv.create_school("A").await;
    let school_b = srv.create_school("B").await;
    let admin_a = srv.staff(&srv.root(), "a@a.test", "admin", Some(&school_a)).await;
    let admin_b = srv.staff(&srv.root(), "b@b.test", "admin", Some(&school_b)).await;

    let (_, student_a) = srv.post(&admin_a, "/students", json!({ "name": "Only in A" })).await;
    srv.post(&admin_b, "/students", json!({ "name": "Only in B" })).await;
    let path_a = format!("/students/{}", student_a["id"].as_str().unwrap());

    let (status, _) = srv.get(&admin_b, &path_a).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A non-superadmin's impersonation header is ignored.
    let (_, listed) = srv
        .send(
            srv.client
                .get(srv.url("/students"))
                .bearer_auth(&admin_a)
                .header(IMPERSONATE_HEADER, &school_b),
        )
        .await;
    let names: Vec<_> = listed["items"].as_array().unwrap().iter().map(|s| s["name"].clone()).collect();
    assert_eq!(names, vec![json!("Only in A")]);

    // A superadmin sees exactly the impersonated school.
    let (status, listed) = srv
        .send(
            srv.client
                .get(srv.url("/students"))
                .bearer_auth(srv.root())
                .header(IMPERSONATE_HEADER, &school_b),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{listed}");
    let names: Vec<_> = listed["items"].as_array().unwrap().iter().map(|s| s["name"].clone()).collect();
    assert_eq!(names, vec![json!("Only in B")]);

    // Without a school, the superadmin has no tenant context.
    let (status, _) = srv.get(&srv.root(), "/students").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_session_carries_impersonation_across_reloads() {
    let srv = TestServer::spawn().await;
    let school = srv.create_school("B").await;
    let admin = srv.staff(&srv.root(), "b@b.test", "admin", Some(&school)).await;
    srv.post(&admin, "/students", json!({ "name": "Bruno" })).await;

    let root_profile = Profile::new(
        UserId::new("root-identity"),
        ROOT_EMAIL,
        "Superadmin",
        Role::SuperAdmin,
        None,
    );
    let root_identity = Identity::new(root_profile.id.clone(), ROOT_EMAIL);
    let local = Arc::new(InMemoryLocalStore::new());

    let mut session = Session::new(local.clone());
    session.sign_in(root_identity.clone(), root_profile.clone());
    session
        .start_impersonation(SchoolId::new(school.as_str()), "B", Utc::now())
        .unwrap();

    // A fresh session over the same local store picks the context back up.
    let mut reloaded = Session::new(local.clone());
    reloaded.sign_in(root_identity, root_profile);
    let target = reloaded.impersonation().unwrap().school_id.clone();
    assert_eq!(reloaded.scope().unwrap().role(), Role::Admin);

    let (status, listed) = srv
        .send(
            srv.client
                .get(srv.url("/students"))
                .bearer_auth(srv.root())
                .header(IMPERSONATE_HEADER, target.as_str()),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{listed}");
    assert_eq!(listed["items"][0]["name"], "Bruno");

    reloaded.logout();
    assert!(!reloaded.is_impersonating());
    assert!(local.get(IMPERSONATION_KEY).is_none());
}

#[tokio::test]
async fn provisioning_enforces_the_role_hierarchy() {
    let srv = TestServer::spawn().await;
    let school_a = srv.create_school("A").await;
    let school_b = srv.create_school("B").await;
    let admin = srv.staff(&srv.root(), "a@a.test", "admin", Some(&school_a)).await;

    let (status, _) = srv
        .post(
            &admin,
            "/admin/users",
            json!({ "email": "x@a.test", "password": "secret1", "name": "X", "role": "admin", "schoolId": school_a }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .post(
            &admin,
            "/admin/users",
            json!({ "email": "y@b.test", "password": "secret1", "name": "Y", "role": "teacher", "schoolId": school_b }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv
        .post(
            &admin,
            "/admin/users",
            json!({ "email": "z@a.test", "password": "123", "name": "Z", "role": "teacher" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let teacher = srv.staff(&admin, "t@a.test", "teacher", None).await;
    let (status, _) = srv.get(&teacher, "/admin/teachers").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, teachers) = srv.get(&admin, "/admin/teachers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(teachers["items"].as_array().unwrap().len(), 1);

    let (status, orphans) = srv.get(&srv.root(), "/admin/orphaned-identities").await;
    assert_eq!(status, StatusCode::OK);
    assert!(orphans["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleted_school_refuses_its_staff() {
    let srv = TestServer::spawn().await;
    let school = srv.create_school("Closing").await;
    let admin = srv.staff(&srv.root(), "a@closing.test", "admin", Some(&school)).await;
    srv.post(&admin, "/students", json!({ "name": "Last" })).await;

    let (status, report) = srv.delete(&srv.root(), &format!("/schools/{school}")).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["deletedDocuments"], 1);
    assert_eq!(report["remainingProfiles"], 1);

    let (status, body) = srv.get(&admin, "/whoami").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
