use thiserror::Error;

/// An error that can occur when processing transit data.
#[derive(Error, Debug)]
pub enum Error {
    /// Cooperative signal that every input is up to date and there is nothing to do.
    #[error("input not modified")]
    InputNotModified,
    #[error("query returned no rows: {0}")]
    EmptyQueryResult(String),
    #[error("invalid value for {entity}.{field}: {value}")]
    InvalidValue {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("'{0}' is not a valid time")]
    InvalidTime(String),
    #[error("'{0}' is not a valid date")]
    InvalidDate(String),
    #[error("operation would produce a non-representable date range: {0}")]
    NonRepresentableRange(String),
    #[error("intermediate input cache is corrupted: {0}")]
    InvalidFeedCache(String),
    #[error("operation requires a file-backed database")]
    NoDatabaseFile,
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    MultipleData(#[from] MultipleDataErrors),
    #[error("impossible to read or write file")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error("impossible to parse metadata sidecar")]
    Sidecar(#[from] serde_json::Error),
    #[error("impossible to parse YAML document")]
    Yaml(#[from] serde_yaml::Error),
    #[cfg(feature = "read-url")]
    #[error("impossible to remotely access resource")]
    Fetch(#[from] reqwest::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error related to incorrect input data.
///
/// DataErrors may be caught and the surrounding process may continue;
/// any process raising one must not leave the pipeline in an undefined state.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("resource {0} is required, but not cached")]
    ResourceNotCached(String),
    #[error("no services left after calendar truncation to {0}")]
    NoServicesLeft(String),
    #[error("{0}")]
    Other(String),
}

/// Raised when a process encounters a non-zero amount of [DataError]s.
#[derive(Debug)]
pub struct MultipleDataErrors {
    pub context: String,
    pub errors: Vec<DataError>,
}

impl std::error::Error for MultipleDataErrors {}

impl std::fmt::Display for MultipleDataErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error(s) encountered during {}:",
            self.errors.len(),
            self.context
        )?;
        for error in &self.errors {
            write!(f, "\n    {}", error)?;
        }
        Ok(())
    }
}

impl MultipleDataErrors {
    /// Drains an iterator of fallible items, catching every [DataError] along the way.
    ///
    /// If no items failed, returns all of the successful items. Otherwise,
    /// a single [MultipleDataErrors] with every collected failure is returned.
    pub fn catch_all<T>(
        context: &str,
        items: impl IntoIterator<Item = Result<T, DataError>>,
    ) -> Result<Vec<T>, MultipleDataErrors> {
        let mut elements = Vec::new();
        let mut errors = Vec::new();
        for item in items {
            match item {
                Ok(element) => elements.push(element),
                Err(error) => errors.push(error),
            }
        }
        if errors.is_empty() {
            Ok(elements)
        } else {
            Err(MultipleDataErrors {
                context: context.to_string(),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_even(x: i32) -> Result<i32, DataError> {
        if x % 2 == 0 {
            Ok(x / 2)
        } else {
            Err(DataError::Other(format!("odd number: {x}")))
        }
    }

    #[test]
    fn catch_all_without_errors() {
        let result = MultipleDataErrors::catch_all("halving", [2, 4, 6].map(half_even));
        assert_eq!(result.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn catch_all_collects_every_error() {
        let result = MultipleDataErrors::catch_all("halving", [2, 3, 4, 5].map(half_even));
        let err = result.unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(
            err.to_string(),
            "2 error(s) encountered during halving:\n    odd number: 3\n    odd number: 5"
        );
    }
}
