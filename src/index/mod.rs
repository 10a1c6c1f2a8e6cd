// Index structures

pub mod btree;
