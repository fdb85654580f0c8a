//! Input validation for the forms that gate writes.
//!
//! A form is deserialized leniently (every field defaults to empty) and then
//! cleaned. Cleaning either yields typed values or hands the submitted form
//! back together with per-field errors so it can be displayed again.

use crate::model::{
    Id, Text,
    auth::PASSWORD_MIN_LEN,
    group::GroupMarker,
    user::Username,
};
use image::{ImageFormat, ImageReader};
use serde::Deserialize;
use std::{collections::BTreeMap, io::Cursor};

pub const IMAGE_MAX_BYTES: usize = 5 * 1024 * 1024;

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str = "Select a valid choice.";

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.0.iter().map(|(field, messages)| (*field, messages.as_slice()))
    }
}

/// A submitted form that failed validation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct InvalidForm<F> {
    pub form: F,
    pub errors: FormErrors,
}

impl<F> InvalidForm<F> {
    #[must_use]
    pub fn new(form: F, errors: FormErrors) -> Self {
        Self { form, errors }
    }

    #[must_use]
    pub fn with_error(form: F, field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = FormErrors::default();
        errors.add(field, message);
        Self { form, errors }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ImageKind {
    Gif,
    Png,
    Jpeg,
    WebP,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ValidImage {
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

impl ImageKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Gif => "gif",
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::WebP => "webp",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }
}

impl ImageUpload {
    /// Accepts the upload only if it is a readable GIF, PNG, JPEG or WebP image.
    pub fn validate(self) -> Result<ValidImage, &'static str> {
        if self.bytes.len() > IMAGE_MAX_BYTES {
            return Err("The image is too large.");
        }

        let invalid = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
        let format = image::guess_format(&self.bytes).map_err(|_| invalid)?;
        let kind = ImageKind::from_format(format).ok_or(invalid)?;
        ImageReader::with_format(Cursor::new(&self.bytes), format)
            .into_dimensions()
            .map_err(|_| invalid)?;

        Ok(ValidImage {
            kind,
            bytes: self.bytes,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub text: String,
    /// Group id, empty for no group.
    pub group: String,
    #[serde(skip)]
    pub image: Option<ImageUpload>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanedPostForm {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<ValidImage>,
}

impl PostForm {
    pub fn clean(self) -> Result<CleanedPostForm, InvalidForm<PostForm>> {
        let mut errors = FormErrors::default();

        let text = Text::new(self.text.clone())
            .inspect_err(|_| errors.add("text", REQUIRED))
            .ok();

        let group = match self.group.trim() {
            "" => None,
            raw => raw
                .parse::<u64>()
                .map(Id::new)
                .inspect_err(|_| errors.add("group", INVALID_CHOICE))
                .ok(),
        };

        let image = match self.image.clone() {
            Some(upload) if !upload.bytes.is_empty() => upload
                .validate()
                .inspect_err(|message| errors.add("image", *message))
                .ok(),
            _ => None,
        };

        match text {
            Some(text) if errors.is_empty() => Ok(CleanedPostForm { text, group, image }),
            _ => Err(InvalidForm::new(
                PostForm {
                    image: None,
                    ..self
                },
                errors,
            )),
        }
    }
}

impl CleanedPostForm {
    /// The form as it would be displayed again.
    #[must_use]
    pub fn to_form(&self) -> PostForm {
        PostForm {
            text: self.text.get().to_owned(),
            group: self.group.map(|group| group.to_string()).unwrap_or_default(),
            image: None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

impl CommentForm {
    pub fn clean(self) -> Result<Text, InvalidForm<CommentForm>> {
        match Text::new(self.text.clone()) {
            Ok(text) => Ok(text),
            Err(_) => Err(InvalidForm::with_error(self, "text", REQUIRED)),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanedSignupForm {
    pub username: Username,
    pub password: String,
}

impl SignupForm {
    pub fn clean(self) -> Result<CleanedSignupForm, InvalidForm<SignupForm>> {
        let mut errors = FormErrors::default();

        let username = Username::new(self.username.clone())
            .inspect_err(|_| {
                errors.add(
                    "username",
                    "Enter a valid username: letters, digits and @/./+/-/_ only.",
                );
            })
            .ok();

        if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.add(
                "password",
                format!("The password must contain at least {PASSWORD_MIN_LEN} characters."),
            );
        }

        match username {
            Some(username) if errors.is_empty() => Ok(CleanedSignupForm {
                username,
                password: self.password,
            }),
            _ => Err(InvalidForm::new(
                SignupForm {
                    password: String::new(),
                    ..self
                },
                errors,
            )),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

#[cfg(test)]
mod tests {
    use crate::form::{CommentForm, ImageKind, ImageUpload, PostForm, SignupForm};
    use crate::model::Id;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];

    #[test]
    fn valid_post_form() {
        let form = PostForm {
            text: "Test post".to_owned(),
            group: "3".to_owned(),
            image: None,
        };

        let cleaned = form.clean().unwrap();
        assert_eq!(cleaned.text.get(), "Test post");
        assert_eq!(cleaned.group, Some(Id::new(3)));
        assert_eq!(cleaned.to_form().group, "3");
    }

    #[test]
    fn blank_post_text_is_a_field_error() {
        let form = PostForm {
            text: "   ".to_owned(),
            group: "not-a-number".to_owned(),
            image: None,
        };

        let invalid = form.clean().unwrap_err();
        assert_eq!(invalid.errors.field("text").len(), 1);
        assert_eq!(invalid.errors.field("group").len(), 1);
        assert!(invalid.errors.field("image").is_empty());
        assert_eq!(invalid.form.text, "   ");
    }

    #[test]
    fn image_upload_is_sniffed() {
        let image = ImageUpload {
            file_name: Some("small.gif".to_owned()),
            bytes: SMALL_GIF.to_vec(),
        }
        .validate()
        .unwrap();
        assert_eq!(image.kind, ImageKind::Gif);

        let not_image = ImageUpload {
            file_name: Some("notes.txt".to_owned()),
            bytes: b"plain text, not an image".to_vec(),
        };
        assert!(not_image.validate().is_err());
    }

    #[test]
    fn post_form_rejects_bad_image() {
        let form = PostForm {
            text: "With attachment".to_owned(),
            group: String::new(),
            image: Some(ImageUpload {
                file_name: None,
                bytes: b"GIF89a".to_vec(),
            }),
        };

        let invalid = form.clean().unwrap_err();
        assert_eq!(invalid.errors.field("image").len(), 1);
        assert!(invalid.form.image.is_none());
    }

    #[test]
    fn comment_form() {
        assert_eq!(
            CommentForm {
                text: "Test comment".to_owned()
            }
            .clean()
            .unwrap()
            .get(),
            "Test comment"
        );
        assert!(CommentForm::default().clean().is_err());
    }

    #[test]
    fn signup_form() {
        let cleaned = SignupForm {
            username: "VIP_NPS".to_owned(),
            password: "long enough".to_owned(),
        }
        .clean()
        .unwrap();
        assert_eq!(cleaned.username.get(), "VIP_NPS");

        let invalid = SignupForm {
            username: "bad name".to_owned(),
            password: "short".to_owned(),
        }
        .clean()
        .unwrap_err();
        assert_eq!(invalid.errors.iter().count(), 2);
        assert!(invalid.form.password.is_empty());
    }
}
