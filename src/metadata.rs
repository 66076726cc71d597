//! Per-item metadata records.

use serde_json::{Map, Value, json};

use crate::{
    compose::Item,
    foundation::{
        config::Config,
        error::{GenError, GenResult},
    },
};

/// Absolute URI that image file names are resolved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUri {
    raw: String,
    /// Byte offset where the path component starts.
    path_start: usize,
    /// Byte offset where the query/fragment starts, or `raw.len()`.
    path_end: usize,
}

impl BaseUri {
    /// Parse an absolute URI (`scheme:[//authority]path[?query][#fragment]`).
    pub fn parse(raw: &str) -> GenResult<Self> {
        let invalid = |why: &str| GenError::config(format!("invalid base_uri '{raw}': {why}"));

        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("contains whitespace"));
        }
        let Some((scheme, rest)) = raw.split_once(':') else {
            return Err(invalid("missing scheme"));
        };
        let mut chars = scheme.chars();
        let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(invalid("missing scheme"));
        }

        let after_scheme = scheme.len() + 1;
        let path_start = match rest.strip_prefix("//") {
            Some(auth) => {
                let auth_len = auth.find(['/', '?', '#']).unwrap_or(auth.len());
                if auth_len == 0 {
                    return Err(invalid("empty authority"));
                }
                after_scheme + 2 + auth_len
            }
            None => after_scheme,
        };
        let path_end = raw[path_start..]
            .find(['?', '#'])
            .map_or(raw.len(), |i| path_start + i);

        Ok(Self {
            raw: raw.to_string(),
            path_start,
            path_end,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve a relative file name against this URI.
    ///
    /// The last path segment of the base is replaced and `.`/`..` segments are removed, so
    /// `https://x/meta`, `https://x/` and `https://x/a/../` all resolve `7.png` to
    /// `https://x/7.png`.
    pub fn join(&self, file_name: &str) -> String {
        let prefix = &self.raw[..self.path_start];
        let path = &self.raw[self.path_start..self.path_end];
        let has_authority = prefix.contains("//");
        let merged = match path.rfind('/') {
            Some(i) => format!("{}{file_name}", &path[..=i]),
            None if has_authority => format!("/{file_name}"),
            None => file_name.to_string(),
        };
        format!("{prefix}{}", remove_dot_segments(&merged))
    }
}

/// RFC 3986 dot-segment removal for a merged path whose last segment is a file name.
fn remove_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "." => {}
            ".." => {
                // The leading empty segment of an absolute path is the root; never pop it.
                if out.last().is_some_and(|s| !s.is_empty()) || out.len() > 1 {
                    out.pop();
                }
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Builds metadata records for a collection.
#[derive(Clone, Debug)]
pub struct MetadataBuilder {
    base_uri: BaseUri,
    extension: &'static str,
    mime_type: &'static str,
    solana_creator: Option<String>,
    additional: Map<String, Value>,
}

impl MetadataBuilder {
    pub fn new(
        config: &Config,
        extension: &'static str,
        mime_type: &'static str,
    ) -> GenResult<Self> {
        let solana_creator = if config.is_solana {
            let creator = config.solana_creator_address.clone().ok_or_else(|| {
                GenError::config("is_solana requires solana_creator_address")
            })?;
            Some(creator)
        } else {
            None
        };

        Ok(Self {
            base_uri: BaseUri::parse(&config.base_uri)?,
            extension,
            mime_type,
            solana_creator,
            additional: config
                .additional_data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Image URI of item `id`.
    pub fn image_uri(&self, id: u64) -> String {
        self.base_uri.join(&format!("{id}.{}", self.extension))
    }

    /// Metadata record for `item` as a JSON value.
    pub fn record(&self, item: &Item) -> Value {
        let image = self.image_uri(item.id);
        let attributes = item
            .layers
            .iter()
            .map(|a| json!({ "trait_type": a.layer, "value": a.name }))
            .collect::<Vec<_>>();

        let mut record = Map::new();
        record.insert(
            "name".to_string(),
            json!(format!("{} #{}", item.name_prefix, item.id)),
        );
        record.insert("id".to_string(), json!(item.id));
        record.insert("image".to_string(), json!(image));
        record.insert("attributes".to_string(), Value::Array(attributes));

        if let Some(creator) = &self.solana_creator {
            record.insert(
                "properties".to_string(),
                json!({
                    "files": [{ "uri": image, "type": self.mime_type }],
                    "category": "image",
                    "creators": [{ "address": creator, "share": 100 }],
                }),
            );
        }

        for (k, v) in &self.additional {
            record.insert(k.clone(), v.clone());
        }
        Value::Object(record)
    }

    /// Pretty-printed JSON bytes of [`MetadataBuilder::record`].
    pub fn to_bytes(&self, item: &Item) -> GenResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.record(item))
            .map_err(|e| GenError::pipeline(format!("encode metadata for item {}: {e}", item.id)))
    }
}

#[cfg(test)]
#[path = "../tests/unit/metadata.rs"]
mod tests;
