use crate::server::{
    Result, ServerError, ServerRouter, ValidationError, auth::AuthenticatedUser, json::Json,
    page::RequestedPage, routes::profiles::redirect_to_profile,
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use blogwerk_common::{
    model::{
        Id,
        comment::{Comment, CommentContent},
        group::Group,
        post::{Post, PostContent, PostMarker},
    },
    pagination::{Page, Paginator},
};
use blogwerk_db::store::SharedStore;
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_post)
        .typed_get(create_post_form)
        .typed_post(create_post)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_post(delete_post)
        .typed_post(create_comment)
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
enum FieldKind {
    Text,
    Choice,
    Image,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct FormField {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const POST_FORM_FIELDS: &[FormField] = &[
    FormField {
        name: "text",
        kind: FieldKind::Text,
        required: true,
    },
    FormField {
        name: "group",
        kind: FieldKind::Choice,
        required: false,
    },
    FormField {
        name: "image",
        kind: FieldKind::Image,
        required: false,
    },
];

/// Describes the create/edit form. `groups` are the choices for the `group` field.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct PostForm {
    is_edit: bool,
    fields: &'static [FormField],
    initial: Option<PostContent>,
    groups: Vec<Group>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct PostDetail {
    post: Post,
    author_post_count: usize,
    comments: Page<Comment>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct GetPostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    GetPostPath { id }: GetPostPath,
    State(store): State<SharedStore>,
    State(paginator): State<Paginator>,
    RequestedPage(page): RequestedPage,
) -> Result<Json<PostDetail>> {
    let post = fetch_post(&store, id).await?;
    let author_post_count = store.count_posts_by_author(post.author.id).await?;
    let comments = store.fetch_comments(id).await?;

    Ok(Json(PostDetail {
        post,
        author_post_count,
        comments: paginator.paginate(comments, page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create", rejection(ServerError))]
struct CreatePostPath();

async fn create_post_form(
    CreatePostPath(): CreatePostPath,
    State(store): State<SharedStore>,
    _user: AuthenticatedUser,
) -> Result<Json<PostForm>> {
    Ok(Json(PostForm {
        is_edit: false,
        fields: POST_FORM_FIELDS,
        initial: None,
        groups: store.fetch_groups().await?,
    }))
}

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
    Json(content): Json<PostContent>,
) -> Result<Redirect> {
    validate_group(&store, &content).await?;

    let post = store.create_post(user.user_id(), &content).await?;
    info!(post = %post.id, author = %post.author.id, "Post created");

    Ok(redirect_to_profile(&post.author))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit", rejection(ServerError))]
struct EditPostPath {
    id: Id<PostMarker>,
}

async fn edit_post_form(
    EditPostPath { id }: EditPostPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
) -> Result<Json<PostForm>> {
    let post = fetch_authored_post(&store, id, &user).await?;

    Ok(Json(PostForm {
        is_edit: true,
        fields: POST_FORM_FIELDS,
        initial: Some(PostContent {
            text: post.text,
            group: post.group.map(|group| group.id),
            image: post.image,
        }),
        groups: store.fetch_groups().await?,
    }))
}

async fn edit_post(
    EditPostPath { id }: EditPostPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
    content: Result<Json<PostContent>, ServerError>,
) -> Result<Redirect> {
    fetch_authored_post(&store, id, &user).await?;
    let Json(content) = content?;
    validate_group(&store, &content).await?;

    store
        .update_post(id, &content)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    info!(post = %id, "Post edited");

    Ok(redirect_to_post(id))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/delete", rejection(ServerError))]
struct DeletePostPath {
    id: Id<PostMarker>,
}

async fn delete_post(
    DeletePostPath { id }: DeletePostPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let post = fetch_authored_post(&store, id, &user).await?;

    if store.delete_post(id).await? {
        info!(post = %id, "Post deleted");
    }

    Ok(redirect_to_profile(&post.author))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment", rejection(ServerError))]
struct CreateCommentPath {
    id: Id<PostMarker>,
}

async fn create_comment(
    CreateCommentPath { id }: CreateCommentPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
    Json(content): Json<CommentContent>,
) -> Result<Redirect> {
    fetch_post(&store, id).await?;

    let comment = store
        .create_comment(id, user.user_id(), &content.text)
        .await?;
    info!(post = %id, comment = %comment.id, author = %user.user_id(), "Comment created");

    Ok(redirect_to_post(id))
}

async fn fetch_post(store: &SharedStore, id: Id<PostMarker>) -> Result<Post> {
    store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

/// Fetches a post the user is about to change. Anyone but the author is sent
/// back to the post.
async fn fetch_authored_post(
    store: &SharedStore,
    id: Id<PostMarker>,
    user: &AuthenticatedUser,
) -> Result<Post> {
    let post = fetch_post(store, id).await?;

    if post.author.id == user.user_id() {
        Ok(post)
    } else {
        Err(ServerError::NotPostAuthor { post: id })
    }
}

async fn validate_group(store: &SharedStore, content: &PostContent) -> Result<()> {
    if let Some(group) = content.group
        && store.fetch_group(group).await?.is_none()
    {
        return Err(ValidationError::UnknownGroup(group).into());
    }

    Ok(())
}

fn redirect_to_post(id: Id<PostMarker>) -> Redirect {
    Redirect::to(&format!("/posts/{id}"))
}
