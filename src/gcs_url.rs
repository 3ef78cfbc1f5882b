//! Parsing and formatting of `gs://bucket/object#generation` addresses.

use std::fmt;

/// A logical object-storage address: bucket, object name, and an
/// optional generation pinning a specific immutable version of the
/// object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsUrl {
    pub bucket: String,
    pub object: String,
    pub generation: Option<i64>,
}

impl GcsUrl {
    /// Parses `gs://bucket/object` or `gs://bucket/object#generation`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let rest = raw
            .strip_prefix("gs://")
            .ok_or_else(|| format!("missing gs:// scheme in {raw:?}"))?;

        let (path, generation) = match rest.split_once('#') {
            Some((path, gen_str)) => {
                let generation = gen_str
                    .parse::<i64>()
                    .map_err(|_| format!("invalid generation {gen_str:?} in {raw:?}"))?;
                (path, Some(generation))
            }
            None => (rest, None),
        };

        let (bucket, object) = path
            .split_once('/')
            .ok_or_else(|| format!("missing object path in {raw:?}"))?;

        if bucket.is_empty() {
            return Err(format!("empty bucket in {raw:?}"));
        }
        if object.is_empty() {
            return Err(format!("empty object in {raw:?}"));
        }

        Ok(GcsUrl {
            bucket: bucket.to_string(),
            object: object.to_string(),
            generation,
        })
    }
}

impl fmt::Display for GcsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            Some(generation) => write!(f, "gs://{}/{}#{}", self.bucket, self.object, generation),
            None => write!(f, "gs://{}/{}", self.bucket, self.object),
        }
    }
}
