//! HTML rendering.
//!
//! Every page is assembled from plain strings. All user-provided content
//! goes through [`escape`] before it is written.

use axum::http::StatusCode;
use time::{format_description::BorrowedFormatItem, macros::format_description};
use yatube_common::{
    form::{CommentForm, FormErrors, LoginForm, PostForm, SignupForm},
    model::{
        Id,
        comment::Comment,
        group::Group,
        post::{Post, PostMarker},
        user::User,
    },
    pagination::{Page, PageWindow},
};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]");

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn layout(title: &str, viewer: Option<&User>, body: &str) -> String {
    let nav = match viewer {
        Some(user) => format!(
            "<a href=\"/create/\">New post</a> \
             <a href=\"/follow/\">Subscriptions</a> \
             <a href=\"/profile/{username}/\">{username}</a> \
             <a href=\"/auth/logout/\">Log out</a>",
            username = escape(user.username.get()),
        ),
        None => "<a href=\"/auth/login/\">Log in</a> <a href=\"/auth/signup/\">Sign up</a>"
            .to_owned(),
    };

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n\
         <header><nav><a href=\"/\">Yatube</a> {nav}</nav></header>\n\
         <main>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

fn post_card(post: &Post) -> String {
    let author = escape(post.author.username.get());
    let date = post.created_at.format(DATE_FORMAT).unwrap_or_default();

    let group = post
        .group
        .as_ref()
        .map(|group| {
            format!(
                "<a class=\"group\" href=\"/group/{}/\">{}</a>",
                escape(group.slug.get()),
                escape(group.title.get()),
            )
        })
        .unwrap_or_default();

    let image = post
        .image
        .as_ref()
        .map(|image| format!("<img src=\"/media/{}\" alt=\"\">", escape(image)))
        .unwrap_or_default();

    format!(
        "<article>\n<p class=\"meta\"><a href=\"/profile/{author}/\">{author}</a> {date}</p>\n\
         {image}<p class=\"text\">{text}</p>\n{group} <a href=\"/posts/{id}/\">Details</a>\n</article>\n",
        text = escape(post.text.get()),
        id = post.id,
    )
}

fn post_list(page: &Page<Post>, base_path: &str) -> String {
    let mut html: String = page.items.iter().map(post_card).collect();
    html.push_str(&paginator(&page.window, base_path));
    html
}

fn paginator(window: &PageWindow, base_path: &str) -> String {
    if window.num_pages <= 1 {
        return String::new();
    }

    let link = |number: u64, label: &str| format!("<a href=\"{base_path}?page={number}\">{label}</a>");

    let mut html = String::from("<nav class=\"pagination\">");
    if let Some(previous) = window.previous_number() {
        html.push_str(&link(1, "First"));
        html.push_str(&link(previous, "Previous"));
    }
    html.push_str(&format!(
        "<span>Page {} of {}</span>",
        window.number, window.num_pages
    ));
    if let Some(next) = window.next_number() {
        html.push_str(&link(next, "Next"));
        html.push_str(&link(window.num_pages, "Last"));
    }
    html.push_str("</nav>\n");
    html
}

fn field_errors(errors: &FormErrors, field: &str) -> String {
    errors
        .field(field)
        .iter()
        .map(|message| format!("<p class=\"error\">{}</p>\n", escape(message)))
        .collect()
}

pub fn index_page(viewer: Option<&User>, page: &Page<Post>) -> String {
    let body = format!("<h1>Latest posts</h1>\n{}", post_list(page, "/"));
    layout("Yatube", viewer, &body)
}

pub fn group_page(viewer: Option<&User>, group: &Group, page: &Page<Post>) -> String {
    let slug = escape(group.slug.get());
    let body = format!(
        "<h1>{title}</h1>\n<p class=\"description\">{description}</p>\n{posts}",
        title = escape(group.title.get()),
        description = escape(&group.description),
        posts = post_list(page, &format!("/group/{slug}/")),
    );
    layout(group.title.get(), viewer, &body)
}

pub fn profile_page(
    viewer: Option<&User>,
    author: &User,
    page: &Page<Post>,
    following: bool,
) -> String {
    let username = escape(author.username.get());

    let follow_button = match viewer {
        Some(viewer) if viewer.id != author.id => {
            if following {
                format!("<a class=\"unfollow\" href=\"/profile/{username}/unfollow/\">Unfollow</a>")
            } else {
                format!("<a class=\"follow\" href=\"/profile/{username}/follow/\">Follow</a>")
            }
        }
        _ => String::new(),
    };

    let body = format!(
        "<h1>All posts by {username}</h1>\n<p>Posts: {count}</p>\n{follow_button}\n{posts}",
        count = page.window.count,
        posts = post_list(page, &format!("/profile/{username}/")),
    );
    layout(&format!("Profile of {}", author.username), viewer, &body)
}

pub fn follow_page(viewer: Option<&User>, page: &Page<Post>) -> String {
    let body = format!(
        "<h1>Posts by authors you follow</h1>\n{}",
        post_list(page, "/follow/")
    );
    layout("Subscriptions", viewer, &body)
}

pub fn post_detail_page(
    viewer: Option<&User>,
    post: &Post,
    author_post_count: u64,
    comments: &[Comment],
    form: &CommentForm,
) -> String {
    let edit_link = match viewer {
        Some(viewer) if viewer.id == post.author.id => {
            format!("<a href=\"/posts/{}/edit/\">Edit</a>\n", post.id)
        }
        _ => String::new(),
    };

    let comment_form = if viewer.is_some() {
        format!(
            "<form method=\"post\" action=\"/posts/{id}/comment/\">\n\
             <textarea name=\"text\">{text}</textarea>\n<button type=\"submit\">Send</button>\n</form>\n",
            id = post.id,
            text = escape(&form.text),
        )
    } else {
        String::new()
    };

    let comments: String = comments
        .iter()
        .map(|comment| {
            format!(
                "<div class=\"comment\"><a href=\"/profile/{author}/\">{author}</a> \
                 <p>{text}</p></div>\n",
                author = escape(comment.author.username.get()),
                text = escape(comment.text.get()),
            )
        })
        .collect();

    let body = format!(
        "{card}<p>Posts by author: {author_post_count}</p>\n{edit_link}\
         <section class=\"comments\">\n{comment_form}{comments}</section>",
        card = post_card(post),
    );
    layout(&post.to_string(), viewer, &body)
}

pub fn post_form_page(
    viewer: Option<&User>,
    form: &PostForm,
    errors: &FormErrors,
    groups: &[Group],
    editing: Option<Id<PostMarker>>,
) -> String {
    let (title, action) = match editing {
        Some(id) => ("Edit post".to_owned(), format!("/posts/{id}/edit/")),
        None => ("New post".to_owned(), "/create/".to_owned()),
    };

    let options: String = groups
        .iter()
        .map(|group| {
            let selected = if form.group == group.id.to_string() {
                " selected"
            } else {
                ""
            };
            format!(
                "<option value=\"{id}\"{selected}>{title}</option>\n",
                id = group.id,
                title = escape(group.title.get()),
            )
        })
        .collect();

    let body = format!(
        "<h1>{title}</h1>\n\
         <form method=\"post\" action=\"{action}\" enctype=\"multipart/form-data\">\n\
         {text_errors}<textarea name=\"text\">{text}</textarea>\n\
         {group_errors}<select name=\"group\">\n<option value=\"\">---------</option>\n{options}</select>\n\
         {image_errors}<input type=\"file\" name=\"image\" accept=\"image/*\">\n\
         <button type=\"submit\">Save</button>\n</form>",
        text_errors = field_errors(errors, "text"),
        text = escape(&form.text),
        group_errors = field_errors(errors, "group"),
        image_errors = field_errors(errors, "image"),
    );
    layout(&title, viewer, &body)
}

pub fn signup_page(form: &SignupForm, errors: &FormErrors) -> String {
    let body = format!(
        "<h1>Sign up</h1>\n<form method=\"post\" action=\"/auth/signup/\">\n\
         {username_errors}<input name=\"username\" value=\"{username}\">\n\
         {password_errors}<input type=\"password\" name=\"password\">\n\
         <button type=\"submit\">Sign up</button>\n</form>",
        username_errors = field_errors(errors, "username"),
        username = escape(&form.username),
        password_errors = field_errors(errors, "password"),
    );
    layout("Sign up", None, &body)
}

pub fn login_page(form: &LoginForm, error: Option<&str>) -> String {
    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>\n", escape(message)))
        .unwrap_or_default();

    let body = format!(
        "<h1>Log in</h1>\n{error}<form method=\"post\" action=\"/auth/login/\">\n\
         <input type=\"hidden\" name=\"next\" value=\"{next}\">\n\
         <input name=\"username\" value=\"{username}\">\n\
         <input type=\"password\" name=\"password\">\n\
         <button type=\"submit\">Log in</button>\n</form>",
        next = escape(&form.next),
        username = escape(&form.username),
    );
    layout("Log in", None, &body)
}

pub fn not_found_page() -> String {
    layout(
        "Page not found",
        None,
        "<h1>Page not found</h1>\n<p>The requested page does not exist.</p>\n<a href=\"/\">Back to the main page</a>",
    )
}

pub fn error_page(status: StatusCode) -> String {
    let body = format!(
        "<h1>{status}</h1>\n<p>Something went wrong while handling the request.</p>"
    );
    layout("Error", None, &body)
}

#[cfg(test)]
mod tests {
    use crate::server::view::{escape, paginator};
    use yatube_common::pagination::{POSTS_PER_PAGE, Paginator};

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn paginator_links() {
        let single = Paginator::new(3, POSTS_PER_PAGE).get_page(None);
        assert!(paginator(&single, "/").is_empty());

        let first = Paginator::new(13, POSTS_PER_PAGE).get_page(None);
        let html = paginator(&first, "/group/cats/");
        assert!(html.contains("href=\"/group/cats/?page=2\""));
        assert!(!html.contains("Previous"));
    }
}
