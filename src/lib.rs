// Library root
// -----------
// This crate exposes a small library surface for the CLI binary.
//
// Module responsibilities:
// - `api`: Encapsulates HTTP interactions with the WeChat Official Account
//   platform (token exchange, image upload, draft creation, mass send) and
//   the payload types that cross that boundary.
// - `cli`: Defines the subcommand surface and the user-facing flows, and
//   delegates requests to `api`.
//
// Keeping this separation makes the request construction and response
// parsing testable without a network, and leaves room to replace the CLI
// front end later.
pub mod api;
pub mod cli;
