mod common;

mod lifecycle;
mod migration;
mod provisioning;
mod search;
