//! Validation of submitted forms.
//!
//! Cleaning a form either yields values that are safe to persist or a
//! [`FormErrors`] map from field name to messages. Nothing is stored when
//! cleaning fails.

use crate::model::{Id, auth::Password, group::GroupMarker, user::Username};
use base64::{Engine, prelude::BASE64_STANDARD};
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ffi::OsStr, io::Cursor, path::Path};
use thiserror::Error;

pub mod field {
    pub const TEXT: &str = "text";
    pub const GROUP: &str = "group";
    pub const IMAGE: &str = "image";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    /// Errors that concern the form as a whole.
    pub const NON_FIELD: &str = "__all__";
}

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INVALID_CHOICE_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const EMPTY_FILE_MESSAGE: &str = "The submitted file is empty.";
pub const MISSING_FILENAME_MESSAGE: &str = "No filename was submitted with the file.";
pub const INVALID_USERNAME_MESSAGE: &str =
    "Enter a valid username. This value may contain only letters, numbers, \
     and @/./+/-/_ characters.";
pub const USERNAME_TAKEN_MESSAGE: &str = "A user with that username already exists.";
pub const PASSWORD_TOO_SHORT_MESSAGE: &str =
    "This password is too short. It must contain at least 8 characters.";
pub const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[must_use]
pub fn invalid_extension_message(extension: &str, allowed: &[&str]) -> String {
    format!(
        "File extension \u{201c}{extension}\u{201d} is not allowed. Allowed extensions are: {}.",
        allowed.join(", ")
    )
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Error)]
#[serde(transparent)]
#[error("Submitted form was invalid: {0:?}")]
pub struct FormErrors(BTreeMap<&'static str, Vec<String>>);

impl FormErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn extend(&mut self, other: FormErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    /// `Ok(value)` when no error was collected.
    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Text that is neither empty nor whitespace-only.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct RequiredText(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The text is empty")]
pub struct EmptyTextError;

impl RequiredText {
    pub fn new(text: String) -> Result<Self, EmptyTextError> {
        if text.trim().is_empty() {
            Err(EmptyTextError)
        } else {
            Ok(Self(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

/// An uploaded file with its base64 encoded content.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ImageUpload {
    pub filename: String,
    pub content: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanedImage {
    pub filename: String,
    pub content: Vec<u8>,
    pub format: ImageFormat,
}

impl ImageUpload {
    /// Accepts a decodable image whose file extension matches its detected format.
    pub fn clean(self) -> Result<CleanedImage, String> {
        if self.filename.trim().is_empty() {
            return Err(MISSING_FILENAME_MESSAGE.to_owned());
        }

        let content = BASE64_STANDARD
            .decode(self.content.as_bytes())
            .map_err(|_| INVALID_IMAGE_MESSAGE.to_owned())?;
        if content.is_empty() {
            return Err(EMPTY_FILE_MESSAGE.to_owned());
        }

        let format =
            image::guess_format(&content).map_err(|_| INVALID_IMAGE_MESSAGE.to_owned())?;
        ImageReader::with_format(Cursor::new(content.as_slice()), format)
            .into_dimensions()
            .map_err(|_| INVALID_IMAGE_MESSAGE.to_owned())?;

        // Media files are served with a content type picked from their extension.
        let extension = Path::new(&self.filename)
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_lowercase();
        let allowed = format.extensions_str();
        if !allowed.contains(&extension.as_str()) {
            return Err(invalid_extension_message(&extension, allowed));
        }

        Ok(CleanedImage {
            filename: self.filename,
            content,
            format,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<Id<GroupMarker>>,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanedPostForm {
    pub text: RequiredText,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<CleanedImage>,
}

impl PostForm {
    /// Checks the text and image. Whether the group exists is up to the caller.
    pub fn clean(self) -> Result<CleanedPostForm, FormErrors> {
        let mut errors = FormErrors::new();

        let text = RequiredText::new(self.text)
            .map_err(|_| errors.add(field::TEXT, REQUIRED_MESSAGE))
            .ok();
        let image = self
            .image
            .map(ImageUpload::clean)
            .transpose()
            .map_err(|message| errors.add(field::IMAGE, message))
            .ok()
            .flatten();

        match text {
            Some(text) => errors.into_result(CleanedPostForm {
                text,
                group: self.group,
                image,
            }),
            None => Err(errors),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn clean(self) -> Result<RequiredText, FormErrors> {
        RequiredText::new(self.text).map_err(|_| FormErrors::single(field::TEXT, REQUIRED_MESSAGE))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CleanedSignupForm {
    pub username: Username,
    pub password: Password,
    pub first_name: String,
    pub last_name: String,
}

impl SignupForm {
    pub fn clean(self) -> Result<CleanedSignupForm, FormErrors> {
        let mut errors = FormErrors::new();

        let username = if self.username.is_empty() {
            errors.add(field::USERNAME, REQUIRED_MESSAGE);
            None
        } else {
            Username::new(self.username)
                .map_err(|_| errors.add(field::USERNAME, INVALID_USERNAME_MESSAGE))
                .ok()
        };
        let password = if self.password.is_empty() {
            errors.add(field::PASSWORD, REQUIRED_MESSAGE);
            None
        } else {
            Password::new(self.password)
                .map_err(|_| errors.add(field::PASSWORD, PASSWORD_TOO_SHORT_MESSAGE))
                .ok()
        };

        match (username, password) {
            (Some(username), Some(password)) => Ok(CleanedSignupForm {
                username,
                password,
                first_name: self.first_name,
                last_name: self.last_name,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
