/*! Integration tests for Warden.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - session_store: Adapter conformance for the session KV
 * - user: Account lifecycle, sessions, lockout, password flows,
 *   federated identities, and per-user databases
 */

mod session_store;
mod user;
