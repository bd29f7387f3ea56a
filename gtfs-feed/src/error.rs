//! Module for the error management
use thiserror::Error;

/// Specific line from a CSV file that could not be read
#[derive(Debug)]
pub struct LineError {
    /// Headers of the CSV file
    pub headers: Vec<String>,
    /// Values of the line that could not be parsed
    pub values: Vec<String>,
}

/// An error that can occur when reading, processing or writing feed data.
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory file is not present in the feed
    #[error("could not find file {0}")]
    MissingFile(String),
    /// A record references an id that is not present in its table
    #[error("the id {0} is not known")]
    ReferenceError(String),
    /// The given path is neither a file nor a directory
    #[error("could not read feed: {0} is neither a file nor a directory")]
    NotFileNorDirectory(String),
    /// The time is not given in the HH:MM:SS format
    #[error("'{0}' is not a valid time; HH:MM:SS format is expected")]
    InvalidTime(String),
    /// The date is not given in the YYYYMMDD format
    #[error("'{0}' is not a valid date; YYYYMMDD format is expected")]
    InvalidDate(String),
    /// The color is not given in the RRGGBB format, without a leading `#`
    #[error("'{0}' is not a valid color; RRGGBB format is expected, without a leading `#`")]
    InvalidColor(String),
    /// A stop has (0, 0) coordinates and the null-coordinate check is enabled
    #[error("stop '{0}' has null (0, 0) coordinates")]
    NullCoordinates(String),
    /// Generic Input/Output error while reading a file
    #[error("impossible to read file")]
    Io(#[from] std::io::Error),
    /// Impossible to read a named file
    #[error("impossible to read '{file_name}'")]
    NamedFileIo {
        /// The file name that could not be read
        file_name: String,
        /// The initial error that caused the failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Impossible to read a CSV file
    #[error("impossible to read csv file '{file_name}'")]
    Csv {
        /// File name that could not be parsed as CSV
        file_name: String,
        /// The initial error by the csv library
        #[source]
        source: csv::Error,
        /// The line that could not be parsed by the csv library
        line_in_error: Option<LineError>,
    },
    /// Error when trying to unzip the feed archive
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
