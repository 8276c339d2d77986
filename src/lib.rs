
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// IEEE 488.2 definite-length binary blocks, the framing of every binary SCPI response
pub mod block;

// Request/response sessions with one instrument, over VXI-11 or a raw SCPI socket
pub mod transport;

// Drivers for the instruments on the bench
pub mod devices;

// Destinations for finished waveform reads
pub mod sink;

// A connected scope shared between callers
pub mod session;

// The operations the web panel exposes for the oscilloscope
pub mod panel;

pub mod config;
pub mod error;

pub use error::{Error, ErrorKind, Result};
