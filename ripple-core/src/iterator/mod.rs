mod cyclic;
mod primes;

pub use cyclic::{effective_senders_per_shard, group_order_for, CyclicGroup, CyclicIterator};
