//! Integration tests for the Vehicle Package codec live under `tests/`.
