// edustore-memory: in-memory storage adapter for EduStore.
//
// Keeps every table in a HashMap. Used by the test suites and for
// single-process demos where persistence is not needed.

pub mod adapter;

pub use adapter::MemoryAdapter;
