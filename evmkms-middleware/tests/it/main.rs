mod common;

mod builder;

mod pending;
