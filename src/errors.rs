// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the stereo camera application

use std::fmt;

/// Convenience alias for fallible application calls
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error for the binary surface
#[derive(Debug, Clone)]
pub enum AppError {
    /// Failures opening or streaming a camera
    Camera(CameraError),
    /// Saving or loading composites
    Storage(StorageError),
    /// Settings that failed to load or save
    Config(String),
    /// Anything without a dedicated variant
    Other(String),
}

/// Camera open and streaming failures
#[derive(Debug, Clone)]
pub enum CameraError {
    /// Enumeration turned up nothing usable
    NoCameraFound,
    /// Device node exists but may not be opened by this user
    AccessDenied,
    /// The pipeline or device refused to start
    InitializationFailed(String),
    /// The stream ended while running
    Disconnected,
    /// Requested capture format rejected by the device
    FormatNotSupported(String),
}

/// Composite save/load errors
#[derive(Debug, Clone)]
pub enum StorageError {
    /// No composite has been produced yet
    NothingToSave,
    /// Image encoding failed
    EncodingFailed(String),
    /// Writing the file failed
    SaveFailed(String),
}

impl CameraError {
    /// Fixed user-facing message shown by the viewer in place of the preview.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::NoCameraFound => "This device's camera could not be found.",
            CameraError::AccessDenied => {
                "Permission to use the camera was denied.\n\
                 Allow access to the video device, e.g. add your user to the 'video' group."
            }
            CameraError::Disconnected => "The camera stream ended unexpectedly.",
            CameraError::InitializationFailed(_) | CameraError::FormatNotSupported(_) => {
                "The camera could not be started."
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoCameraFound => write!(f, "No usable camera device"),
            CameraError::AccessDenied => write!(f, "Camera access denied"),
            CameraError::InitializationFailed(msg) => write!(f, "Camera start failed: {}", msg),
            CameraError::Disconnected => write!(f, "Camera stream ended"),
            CameraError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NothingToSave => write!(f, "No composite available to save"),
            StorageError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            StorageError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for StorageError {}

// Lifting sub-errors into the application error
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// I/O mappings; a permission failure gets its own variant
impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::SaveFailed(err.to_string())
    }
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            CameraError::AccessDenied
        } else {
            CameraError::InitializationFailed(err.to_string())
        }
    }
}
