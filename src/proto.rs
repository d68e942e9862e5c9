//! Wire records and gRPC clients of the `flwr.proto` package, generated from
//! `proto/flwr/proto/*.proto` at build time.

tonic::include_proto!("flwr.proto");

/// Map of scalars keyed by name, the shape of every config/metrics field.
pub type ScalarMap = std::collections::HashMap<String, Scalar>;
