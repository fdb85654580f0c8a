use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{AuthenticatedUser, Viewer},
    cache::PageCache,
    form::{Form, PostSubmission},
    media::MediaStorage,
    routes::PageQuery,
    view,
};
use axum::{
    Router,
    extract::State,
    http::Uri,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yatube_common::{
    form::{CleanedPostForm, CommentForm, FormErrors, InvalidForm, PostForm},
    model::{
        Id,
        comment::CreateComment,
        post::{CreatePost, PostContent, PostMarker},
        user::User,
    },
};
use yatube_db::{
    PostScope, Store,
    store::{CommentRepository, GroupRepository, PostRepository},
};

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(index)
        .typed_get(post_detail)
        .typed_get(create_page)
        .typed_post(create_post)
        .typed_get(edit_page)
        .typed_post(edit_post)
        .typed_post(add_comment)
}

#[derive(TypedPath)]
#[typed_path("/")]
struct IndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath)]
#[typed_path("/create/")]
struct CreatePath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
struct EditPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
struct CommentPath {
    id: Id<PostMarker>,
}

/// The rendered page embeds the viewer's navigation, so each viewer gets
/// their own entry.
fn index_cache_key(uri: &Uri, viewer: Option<&User>) -> String {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |path_and_query| path_and_query.as_str());

    match viewer {
        Some(user) => format!("index_page:{path}:{}", user.id),
        None => format!("index_page:{path}:anonymous"),
    }
}

async fn index(
    _: IndexPath,
    viewer: Viewer,
    uri: Uri,
    query: PageQuery,
    State(store): State<Arc<dyn Store>>,
    State(page_cache): State<Arc<dyn PageCache>>,
) -> Result<Html<String>> {
    let key = index_cache_key(&uri, viewer.user());
    if let Some(page) = page_cache.get(&key).await {
        debug!(%key, "Serving index page from cache");
        return Ok(Html(page));
    }

    let posts = store
        .fetch_post_page(PostScope::All, query.page.as_deref())
        .await?;
    let page = view::index_page(viewer.user(), &posts);
    page_cache.insert(key, page.clone()).await;

    Ok(Html(page))
}

async fn post_detail(
    PostPath { id }: PostPath,
    viewer: Viewer,
    State(store): State<Arc<dyn Store>>,
) -> Result<Html<String>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let author_post_count = store.count_posts(PostScope::Author(post.author.id)).await?;
    let comments = store.fetch_comments(id).await?;

    Ok(Html(view::post_detail_page(
        viewer.user(),
        &post,
        author_post_count,
        &comments,
        &CommentForm::default(),
    )))
}

/// Cleans the form and checks that the chosen group exists.
async fn clean_post_form(
    store: &dyn Store,
    form: PostForm,
) -> Result<Result<CleanedPostForm, InvalidForm<PostForm>>> {
    let cleaned = match form.clean() {
        Ok(cleaned) => cleaned,
        Err(invalid) => return Ok(Err(invalid)),
    };

    if let Some(group) = cleaned.group
        && store.fetch_group(group).await?.is_none()
    {
        return Ok(Err(InvalidForm::with_error(
            cleaned.to_form(),
            "group",
            "Select a valid choice.",
        )));
    }

    Ok(Ok(cleaned))
}

async fn render_post_form(
    store: &dyn Store,
    user: &User,
    form: &PostForm,
    errors: &FormErrors,
    editing: Option<Id<PostMarker>>,
) -> Result<Response> {
    let groups = store.fetch_groups().await?;
    let page = view::post_form_page(Some(user), form, errors, &groups, editing);

    Ok(Html(page).into_response())
}

async fn save_image(media: &MediaStorage, cleaned: &CleanedPostForm) -> Result<Option<String>> {
    match &cleaned.image {
        Some(image) => Ok(Some(
            media
                .save_post_image(image)
                .await
                .map_err(ServerError::Media)?,
        )),
        None => Ok(None),
    }
}

/// Removes an upload whose post was never written.
async fn discard_image(media: &MediaStorage, uploaded: Option<&str>) {
    if let Some(path) = uploaded {
        media.remove(path).await;
    }
}

async fn create_page(
    _: CreatePath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Response> {
    render_post_form(
        store.as_ref(),
        &user,
        &PostForm::default(),
        &FormErrors::default(),
        None,
    )
    .await
}

async fn create_post(
    _: CreatePath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    State(media): State<MediaStorage>,
    PostSubmission(form): PostSubmission,
) -> Result<Response> {
    let cleaned = match clean_post_form(store.as_ref(), form).await? {
        Ok(cleaned) => cleaned,
        Err(InvalidForm { form, errors }) => {
            debug!(user = %user.id, ?errors, "Rejected invalid post form");
            return render_post_form(store.as_ref(), &user, &form, &errors, None).await;
        }
    };

    let uploaded = save_image(&media, &cleaned).await?;
    let create = CreatePost {
        author: user.id,
        content: PostContent {
            text: cleaned.text,
            group: cleaned.group,
            image: uploaded.clone(),
        },
    };
    let post = match store.create_post(&create).await {
        Ok(post) => post,
        Err(err) => {
            discard_image(&media, uploaded.as_deref()).await;
            return Err(err.into());
        }
    };
    info!(post = %post.id, author = %user.id, "Created post");

    Ok(Redirect::to(&format!("/profile/{}/", user.username)).into_response())
}

async fn edit_page(
    EditPath { id }: EditPath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Response> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.author.id != user.id {
        warn!(post = %id, user = %user.id, "Non-author tried to edit post");
        return Ok(Redirect::to(&format!("/posts/{id}/")).into_response());
    }

    let form = PostForm {
        text: post.text.get().to_owned(),
        group: post
            .group
            .map(|group| group.id.to_string())
            .unwrap_or_default(),
        image: None,
    };

    render_post_form(store.as_ref(), &user, &form, &FormErrors::default(), Some(id)).await
}

async fn edit_post(
    EditPath { id }: EditPath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    State(media): State<MediaStorage>,
    PostSubmission(form): PostSubmission,
) -> Result<Response> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let detail = Redirect::to(&format!("/posts/{id}/"));

    if post.author.id != user.id {
        warn!(post = %id, user = %user.id, "Non-author tried to edit post");
        return Ok(detail.into_response());
    }

    let cleaned = match clean_post_form(store.as_ref(), form).await? {
        Ok(cleaned) => cleaned,
        Err(InvalidForm { form, errors }) => {
            debug!(post = %id, ?errors, "Rejected invalid post form");
            return render_post_form(store.as_ref(), &user, &form, &errors, Some(id)).await;
        }
    };

    let uploaded = save_image(&media, &cleaned).await?;
    let content = PostContent {
        text: cleaned.text,
        group: cleaned.group,
        image: uploaded.clone().or(post.image),
    };
    match store.update_post(id, &content).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            discard_image(&media, uploaded.as_deref()).await;
            return Err(ServerError::PostByIdNotFound(id));
        }
        Err(err) => {
            discard_image(&media, uploaded.as_deref()).await;
            return Err(err.into());
        }
    }
    info!(post = %id, "Edited post");

    Ok(detail.into_response())
}

async fn add_comment(
    CommentPath { id }: CommentPath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    Form(form): Form<CommentForm>,
) -> Result<Redirect> {
    if store.fetch_post(id).await?.is_none() {
        return Err(ServerError::PostByIdNotFound(id));
    }

    match form.clean() {
        Ok(text) => {
            let comment = store
                .create_comment(&CreateComment {
                    post: id,
                    author: user.id,
                    text,
                })
                .await?;
            info!(comment = %comment.id, post = %id, author = %user.id, "Added comment");
        }
        Err(InvalidForm { errors, .. }) => {
            debug!(post = %id, ?errors, "Ignoring invalid comment");
        }
    }

    Ok(Redirect::to(&format!("/posts/{id}/")))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::posts::index_cache_key;
    use axum::http::Uri;
    use yatube_common::model::{
        Id,
        user::{User, Username},
    };

    #[test]
    fn cache_key_varies_by_viewer_and_query() {
        let uri: Uri = "/?page=2".parse().unwrap();
        let user = User {
            id: Id::new(7),
            username: Username::new("auth".to_owned()).unwrap(),
        };

        assert_eq!(index_cache_key(&uri, None), "index_page:/?page=2:anonymous");
        assert_eq!(index_cache_key(&uri, Some(&user)), "index_page:/?page=2:7");
    }
}
