#![deny(clippy::unwrap_used)]

use futures::stream::TryStreamExt;
use refinery::embed_migrations;
use serde::de::IntoDeserializer;
use serde::Deserialize;

pub mod config;
pub mod control;
pub mod subscription;

embed_migrations!("./migrations");

#[derive(Debug)]
pub struct SqlWrapper<T>(pub T);

impl<T> SqlWrapper<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> SqlWrapper<T> {
    pub fn from_sql<R>(r: R) -> Result<T, <Self as TryFrom<R>>::Error>
    where
        Self: TryFrom<R>,
    {
        r.try_into().map(|w: Self| w.0)
    }
}

pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let opt = Option::<String>::deserialize(de)?;
    let opt = opt.as_deref().map(str::trim);
    match opt {
        None | Some("") => Ok(None),
        Some(s) => T::deserialize(s.into_deserializer()).map(Some),
    }
}

pub async fn row_stream_to_vec<T: TryFrom<tokio_postgres::Row, Error = anyhow::Error>>(
    r: tokio_postgres::RowStream,
) -> Result<Vec<T>, anyhow::Error> {
    r.try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .map(T::try_from)
        .collect()
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[derive(Deserialize)]
    struct Query {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        name: Option<String>,
    }

    #[test]
    fn blank_strings_deserialize_as_none() {
        let q: Query = serde_json::from_str(r#"{"name": "  "}"#).unwrap();
        assert_eq!(q.name, None);
        let q: Query = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(q.name, None);
        let q: Query = serde_json::from_str(r#"{"name": " Netflix "}"#).unwrap();
        assert_eq!(q.name.as_deref(), Some("Netflix"));
    }
}
