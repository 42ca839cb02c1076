//! MCP (Model Context Protocol) transport for the Jira/Confluence gateway.
//!
//! **Server** (`server`): JSON-RPC 2.0 request processor behind `POST /mcp`.
//!
//! **SSE** (`sse`): long-lived `POST /sse` streams with handshake, heartbeats
//! and broadcast, plus `POST /sse/messages` for calls answered on a stream.
//!
//! **Dispatcher** (`dispatcher`): tool/resource catalog, invoked with an
//! explicit per-call `ExecutionContext`.
//!
//! Protocol revision 2024-11-05: <https://spec.modelcontextprotocol.io/2024-11-05/>

pub mod dispatcher;
pub mod server;
pub mod sse;
pub mod types;
