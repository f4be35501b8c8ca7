//! Rich embed builder
//!
//! Limits are declared on the types and counted in characters, not bytes.
//! They are checked once in [`EmbedBuilder::build`].

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

pub const TITLE_LIMIT: usize = 256;
pub const DESCRIPTION_LIMIT: usize = 4096;
pub const FIELD_COUNT_LIMIT: usize = 25;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1024;
pub const FOOTER_LIMIT: usize = 2048;
pub const AUTHOR_NAME_LIMIT: usize = 256;
pub const TOTAL_LIMIT: usize = 6000;

// `validator` length bounds must be `u64`.
const TITLE_LIMIT_U64: u64 = TITLE_LIMIT as u64;
const DESCRIPTION_LIMIT_U64: u64 = DESCRIPTION_LIMIT as u64;
const FIELD_NAME_LIMIT_U64: u64 = FIELD_NAME_LIMIT as u64;
const FIELD_VALUE_LIMIT_U64: u64 = FIELD_VALUE_LIMIT as u64;
const FOOTER_LIMIT_U64: u64 = FOOTER_LIMIT as u64;
const AUTHOR_NAME_LIMIT_U64: u64 = AUTHOR_NAME_LIMIT as u64;

/// A validated rich embed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "check_shape"))]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = TITLE_LIMIT_U64))]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = DESCRIPTION_LIMIT_U64))]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// RGB colour as `0xRRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,

    /// ISO 8601 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub footer: Option<EmbedFooter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub author: Option<EmbedAuthor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EmbedFooter {
    #[validate(length(max = FOOTER_LIMIT_U64))]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EmbedAuthor {
    #[validate(length(max = AUTHOR_NAME_LIMIT_U64))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EmbedField {
    #[validate(length(max = FIELD_NAME_LIMIT_U64))]
    pub name: String,
    #[validate(length(max = FIELD_VALUE_LIMIT_U64))]
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl Embed {
    /// Start building an embed
    #[must_use]
    pub fn builder() -> EmbedBuilder {
        EmbedBuilder::default()
    }

    /// Characters counted against the total limit
    #[must_use]
    pub fn total_length(&self) -> usize {
        let text = |value: &Option<String>| value.as_deref().map_or(0, char_count);

        text(&self.title)
            + text(&self.description)
            + self.footer.as_ref().map_or(0, |f| char_count(&f.text))
            + self.author.as_ref().map_or(0, |a| char_count(&a.name))
            + self
                .fields
                .iter()
                .map(|f| char_count(&f.name) + char_count(&f.value))
                .sum::<usize>()
    }

    /// Check every limit, reporting the first violation
    pub fn check_limits(&self) -> Result<(), EmbedError> {
        self.validate().map_err(|errors| self.limit_error(&errors))
    }

    /// Translate validator output into the first violated limit, in
    /// declaration order
    fn limit_error(&self, errors: &ValidationErrors) -> EmbedError {
        let failed = errors.errors();
        let text = |value: &Option<String>| value.as_deref().map_or(0, char_count);

        if failed.contains_key("title") {
            return EmbedError::TitleTooLong {
                len: text(&self.title),
            };
        }
        if failed.contains_key("description") {
            return EmbedError::DescriptionTooLong {
                len: text(&self.description),
            };
        }
        if let Some(ValidationErrorsKind::List(list)) = failed.get("fields") {
            let bad = list
                .iter()
                .find_map(|(&index, nested)| Some((index, nested, self.fields.get(index)?)));
            if let Some((index, nested, field)) = bad {
                return if nested.errors().contains_key("name") {
                    EmbedError::FieldNameTooLong {
                        index,
                        len: char_count(&field.name),
                    }
                } else {
                    EmbedError::FieldValueTooLong {
                        index,
                        len: char_count(&field.value),
                    }
                };
            }
        }
        if let (true, Some(footer)) = (failed.contains_key("footer"), &self.footer) {
            return EmbedError::FooterTooLong {
                len: char_count(&footer.text),
            };
        }
        if let (true, Some(author)) = (failed.contains_key("author"), &self.author) {
            return EmbedError::AuthorNameTooLong {
                len: char_count(&author.name),
            };
        }

        // Only the struct-level checks remain
        if self.fields.len() > FIELD_COUNT_LIMIT {
            EmbedError::TooManyFields {
                count: self.fields.len(),
            }
        } else {
            EmbedError::TotalTooLong {
                len: self.total_length(),
            }
        }
    }
}

/// Field count and total length; runs once every field is individually valid
fn check_shape(embed: &Embed) -> Result<(), ValidationError> {
    if embed.fields.len() > FIELD_COUNT_LIMIT {
        return Err(ValidationError::new("too_many_fields"));
    }
    if embed.total_length() > TOTAL_LIMIT {
        return Err(ValidationError::new("total_length"));
    }
    Ok(())
}

/// Builder for [`Embed`]
#[derive(Debug, Clone, Default)]
pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.embed.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.embed.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.embed.url = Some(url.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.embed.color = Some(color & 0x00FF_FFFF);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.embed.timestamp = Some(timestamp.into());
        self
    }

    pub fn footer(mut self, text: impl Into<String>, icon_url: Option<String>) -> Self {
        self.embed.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.embed.image = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.embed.thumbnail = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.embed.author = Some(EmbedAuthor {
            name: name.into(),
            url: None,
            icon_url: None,
        });
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.embed.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Validate and return the embed
    pub fn build(self) -> Result<Embed, EmbedError> {
        self.embed.check_limits()?;
        Ok(self.embed)
    }
}

/// Embed limit violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbedError {
    #[error("Embed title is {len} characters (max {})", TITLE_LIMIT)]
    TitleTooLong { len: usize },

    #[error("Embed description is {len} characters (max {})", DESCRIPTION_LIMIT)]
    DescriptionTooLong { len: usize },

    #[error("Embed has {count} fields (max {})", FIELD_COUNT_LIMIT)]
    TooManyFields { count: usize },

    #[error("Embed field {index} name is {len} characters (max {})", FIELD_NAME_LIMIT)]
    FieldNameTooLong { index: usize, len: usize },

    #[error("Embed field {index} value is {len} characters (max {})", FIELD_VALUE_LIMIT)]
    FieldValueTooLong { index: usize, len: usize },

    #[error("Embed footer is {len} characters (max {})", FOOTER_LIMIT)]
    FooterTooLong { len: usize },

    #[error("Embed author name is {len} characters (max {})", AUTHOR_NAME_LIMIT)]
    AuthorNameTooLong { len: usize },

    #[error("Embed is {len} characters in total (max {})", TOTAL_LIMIT)]
    TotalTooLong { len: usize },
}

fn char_count(value: &str) -> usize {
    value.chars().count()
}
