use crate::server::{AuthSettings, IndexCache, ServerState, routes};
use axum::{
    Router,
    body::{Body, Bytes},
    http::{
        Method, Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
    },
};
use blogwerk_common::{
    model::{
        Text,
        auth::{AuthToken, Authentication},
        group::{CreateGroup, Group, GroupSlug},
        post::{Post, PostContent},
        user::{CreateUser, User, Username},
    },
    pagination::Paginator,
};
use blogwerk_db::{
    memory::MemoryStore,
    store::{EntityStore, PostFilter},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use time::UtcDateTime;
use tower::ServiceExt;

const INDEX_TTL: Duration = Duration::from_secs(20);

struct TestApp {
    store: Arc<MemoryStore>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = ServerState {
            store: store.clone(),
            paginator: Paginator::default(),
            index_cache: IndexCache::new(INDEX_TTL),
            auth: AuthSettings::default(),
        };

        Self {
            store,
            router: routes().with_state(state),
        }
    }

    async fn user(&self, username: &str) -> User {
        self.store
            .create_user(&CreateUser {
                username: Username::new(username.to_owned()).unwrap(),
                first_name: "First".to_owned(),
                last_name: "Last".to_owned(),
                email: String::new(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
    }

    /// Logs in without going through the password route.
    async fn token_for(&self, user: &User) -> String {
        let token = AuthToken::generate_random(user.id);
        self.store
            .create_authentication(&Authentication {
                user: user.id,
                token_hash: token.hash().unwrap(),
                created_at: UtcDateTime::now(),
                expires_after: None,
            })
            .await
            .unwrap();

        token.as_token_str()
    }

    async fn group(&self, slug: &str) -> Group {
        self.store
            .create_group(&CreateGroup {
                title: format!("Group {slug}"),
                slug: GroupSlug::new(slug.to_owned()).unwrap(),
                description: String::new(),
            })
            .await
            .unwrap()
    }

    async fn post(&self, author: &User, text: &str) -> Post {
        self.store
            .create_post(
                author.id,
                &PostContent {
                    text: Text::new(text.to_owned()).unwrap(),
                    group: None,
                    image: None,
                },
            )
            .await
            .unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, token, Some(body)).await
    }
}

async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

fn item_ids(page: &Value) -> Vec<i64> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn global_feed_is_paginated() {
    let app = TestApp::new();
    let author = app.user("writer").await;
    for i in 0..15 {
        app.post(&author, &format!("Post number {i}")).await;
    }

    let first = body_json(app.get("/", None).await).await;
    assert_eq!(item_ids(&first).len(), 10);
    assert_eq!(first["number"], 1);
    assert_eq!(first["total_pages"], 2);
    assert_eq!(first["has_next"], true);

    let second = body_json(app.get("/?page=2", None).await).await;
    assert_eq!(item_ids(&second).len(), 5);
    assert_eq!(second["has_next"], false);

    let beyond = body_json(app.get("/?page=99", None).await).await;
    assert_eq!(beyond["number"], 2);

    let garbage = body_json(app.get("/?page=abc", None).await).await;
    assert_eq!(garbage["number"], 1);

    let mut all = item_ids(&first);
    all.extend(item_ids(&second));
    let mut expected = all.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(all, expected);
}

#[tokio::test(start_paused = true)]
async fn global_feed_is_stale_until_ttl_expires() {
    let app = TestApp::new();
    let author = app.user("writer").await;
    app.post(&author, "Staying around").await;
    let doomed = app.post(&author, "About to go").await;

    let before = body_bytes(app.get("/", None).await).await;
    assert!(app.store.delete_post(doomed.id).await.unwrap());

    let cached = body_bytes(app.get("/", None).await).await;
    assert_eq!(cached, before);

    tokio::time::advance(INDEX_TTL + Duration::from_secs(1)).await;

    let fresh = body_json(app.get("/", None).await).await;
    assert!(!item_ids(&fresh).contains(&doomed.id.get()));
    assert_eq!(item_ids(&fresh).len(), 1);
}

#[tokio::test]
async fn follow_feed_only_shows_followed_authors() {
    let app = TestApp::new();
    let followed = app.user("followed").await;
    let other = app.user("other").await;
    let follower = app.user("follower").await;

    let followed_post = app.post(&followed, "From the followed author").await;
    app.post(&other, "From someone else").await;
    app.store.create_follow(follower.id, followed.id).await.unwrap();

    let token = app.token_for(&follower).await;
    let page = body_json(app.get("/follow", Some(&token)).await).await;
    assert_eq!(item_ids(&page), vec![followed_post.id.get()]);

    let lonely_token = app.token_for(&other).await;
    let page = body_json(app.get("/follow", Some(&lonely_token)).await).await;
    assert!(item_ids(&page).is_empty());
    assert_eq!(page["total_pages"], 1);
}

#[tokio::test]
async fn anonymous_users_are_sent_to_login() {
    let app = TestApp::new();

    let response = app.get("/follow", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?next=/follow");

    let response = app
        .post_json("/create", None, json!({ "text": "Sneaky" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?next=/create");
    assert!(app.store.fetch_posts(&PostFilter::All).await.unwrap().is_empty());

    let response = app.get("/create", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?next=/create");

    let author = app.user("author").await;
    let post = app.post(&author, "Hands off").await;
    let response = app.get(&format!("/posts/{}/edit", post.id), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("/auth/login?next=/posts/{}/edit", post.id)
    );

    let login = body_json(app.get("/auth/login?next=/create", None).await).await;
    assert_eq!(login["next"], "/create");
}

#[tokio::test]
async fn login_redirect_keeps_next_intact() {
    let app = TestApp::new();
    app.user("a+b").await;

    let response = app
        .send(Method::POST, "/profile/a+b/follow", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let login_uri = location(&response).to_owned();
    assert_eq!(login_uri, "/auth/login?next=/profile/a%2Bb/follow");

    let login = body_json(app.get(&login_uri, None).await).await;
    assert_eq!(login["next"], "/profile/a+b/follow");
}

#[tokio::test]
async fn unknown_group_and_route_are_not_found() {
    let app = TestApp::new();

    assert_eq!(
        app.get("/group/nope", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/posts/12345", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/profile/nobody", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/no/such/route", None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn group_feed_lists_group_posts() {
    let app = TestApp::new();
    let author = app.user("writer").await;
    let group = app.group("rust").await;
    app.post(&author, "Ungrouped").await;
    let grouped = app
        .store
        .create_post(
            author.id,
            &PostContent {
                text: Text::new("Grouped".to_owned()).unwrap(),
                group: Some(group.id),
                image: None,
            },
        )
        .await
        .unwrap();

    let body = body_json(app.get("/group/rust", None).await).await;
    assert_eq!(body["group"]["title"], "Group rust");
    assert_eq!(item_ids(&body["page"]), vec![grouped.id.get()]);
}

#[tokio::test]
async fn only_the_author_may_edit() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let intruder = app.user("intruder").await;
    let post = app.post(&author, "Original text").await;
    let detail_path = format!("/posts/{}", post.id);
    let edit_path = format!("{detail_path}/edit");

    let token = app.token_for(&intruder).await;
    let response = app.get(&edit_path, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail_path);

    let response = app
        .post_json(&edit_path, Some(&token), json!({ "text": "Defaced" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail_path);

    let response = app
        .post_json(&edit_path, Some(&token), json!({ "text": "   " }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail_path);

    let response = app
        .send(Method::POST, &format!("{detail_path}/delete"), Some(&token), None)
        .await;
    assert_eq!(location(&response), detail_path);

    let stored = app.store.fetch_post(post.id).await.unwrap().unwrap();
    assert_eq!(stored.text.get(), "Original text");

    let token = app.token_for(&author).await;
    let form = body_json(app.get(&edit_path, Some(&token)).await).await;
    assert_eq!(form["is_edit"], true);
    assert_eq!(form["initial"]["text"], "Original text");

    let response = app
        .post_json(&edit_path, Some(&token), json!({ "text": "Edited text" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail_path);

    let stored = app.store.fetch_post(post.id).await.unwrap().unwrap();
    assert_eq!(stored.text.get(), "Edited text");
    assert_eq!(stored.created_at, post.created_at);
}

#[tokio::test]
async fn creating_posts_validates_input() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let group = app.group("news").await;
    let token = app.token_for(&author).await;

    let form = body_json(app.get("/create", Some(&token)).await).await;
    assert_eq!(form["is_edit"], false);
    assert_eq!(form["fields"][0]["name"], "text");
    assert_eq!(form["groups"][0]["slug"], "news");

    let blank = app
        .post_json("/create", Some(&token), json!({ "text": "   " }))
        .await;
    assert_eq!(blank.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unknown_group = app
        .post_json("/create", Some(&token), json!({ "text": "Hi", "group": 9999 }))
        .await;
    assert_eq!(unknown_group.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.store.fetch_posts(&PostFilter::All).await.unwrap().is_empty());

    let response = app
        .post_json(
            "/create",
            Some(&token),
            json!({ "text": "Hello there", "group": group.id }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/author");

    let posts = app.store.fetch_posts(&PostFilter::Group(group.id)).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].author.id, author.id);
}

#[tokio::test]
async fn comments_require_login() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let reader = app.user("reader").await;
    let post = app.post(&author, "Discuss").await;
    let comment_path = format!("/posts/{}/comment", post.id);

    let response = app
        .post_json(&comment_path, None, json!({ "text": "Anonymous" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(app.store.fetch_comments(post.id).await.unwrap().is_empty());

    let token = app.token_for(&reader).await;
    let response = app
        .post_json(&comment_path, Some(&token), json!({ "text": "Nice post" }))
        .await;
    assert_eq!(location(&response), format!("/posts/{}", post.id));

    let detail = body_json(app.get(&format!("/posts/{}", post.id), None).await).await;
    assert_eq!(detail["author_post_count"], 1);
    assert_eq!(detail["comments"]["count"], 1);
    assert_eq!(detail["comments"]["items"][0]["text"], "Nice post");
}

#[tokio::test]
async fn follow_and_unfollow_round_trip() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let fan = app.user("fan").await;
    let token = app.token_for(&fan).await;

    let profile = body_json(app.get("/profile/author", Some(&token)).await).await;
    assert_eq!(profile["following"], false);

    for _ in 0..2 {
        let response = app
            .send(Method::POST, "/profile/author/follow", Some(&token), None)
            .await;
        assert_eq!(location(&response), "/profile/author");
    }
    assert_eq!(
        app.store.fetch_followed_authors(fan.id).await.unwrap(),
        vec![author.id]
    );

    let profile = body_json(app.get("/profile/author", Some(&token)).await).await;
    assert_eq!(profile["following"], true);
    assert_eq!(profile["post_count"], 0);

    let anonymous = body_json(app.get("/profile/author", None).await).await;
    assert_eq!(anonymous["following"], false);

    app.send(Method::POST, "/profile/author/unfollow", Some(&token), None)
        .await;
    assert!(!app.store.is_following(fan.id, author.id).await.unwrap());
}

#[tokio::test]
async fn signup_login_logout() {
    let app = TestApp::new();
    let signup = json!({
        "username": "newcomer",
        "first_name": "New",
        "last_name": "Comer",
        "password": "long enough password",
    });

    let response = app.post_json("/auth/signup", None, signup.clone()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user = body_json(response).await;
    assert_eq!(user["username"], "newcomer");
    assert!(user.get("password_hash").is_none());

    let duplicate = app.post_json("/auth/signup", None, signup).await;
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let short = app
        .post_json(
            "/auth/signup",
            None,
            json!({ "username": "other", "password": "short" }),
        )
        .await;
    assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let wrong = app
        .post_json(
            "/auth/login",
            None,
            json!({ "username": "newcomer", "password": "not the password" }),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let login = app
        .post_json(
            "/auth/login",
            None,
            json!({ "username": "newcomer", "password": "long enough password" }),
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let token = body_json(login).await["token"].as_str().unwrap().to_owned();

    assert_eq!(
        app.get("/follow", Some(&token)).await.status(),
        StatusCode::OK
    );

    let logout = app
        .send(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        app.get("/follow", Some(&token)).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let app = TestApp::new();
    let user = app.user("someone").await;

    let garbage = app.get("/follow", Some("not-a-token")).await;
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

    let forged = AuthToken::generate_random(user.id).as_token_str();
    let response = app.get("/follow", Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let valid = app.token_for(&user).await;
    let (_, secret) = valid.split_once(':').unwrap();
    let other_user = format!("999:{secret}");
    assert_eq!(
        app.get("/follow", Some(&other_user)).await.status(),
        StatusCode::UNAUTHORIZED
    );
}
