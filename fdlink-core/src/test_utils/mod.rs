//! Test utilities. Not part of the public API.

pub mod mock_socket;
