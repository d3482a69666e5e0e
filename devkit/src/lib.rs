/*!
# Estufa DevKit - test doubles for the greenhouse dashboard

Lets the dashboard be exercised without a real backend:
- Scriptable in-memory backend (telemetry + assistant)
- Recording view sink
- Axum stub of the greenhouse HTTP API
- Telemetry and chat fixtures
*/

pub mod mock_backend;
pub mod fixtures;
pub mod stub_server;
pub mod test_utils;

pub use mock_backend::{Call, MockBackend, RecordingSink};
pub use fixtures::{BatchBuilder, ReplyBuilder};
pub use stub_server::{StubServer, StubState};
pub use test_utils::TestHarness;
