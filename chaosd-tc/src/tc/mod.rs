//! # Traffic Control
//!
//! This module turns a rule set into the `tc` operations that realise it inside a network
//! namespace. Planning is pure ([`plan`]), execution goes through a
//! [`CommandRunner`](chaosd_exec::CommandRunner) ([`client`]).
//!
//! ## Qdisc tree
//!
//! Global rules (no destination set) are chained one below the other starting at the root of
//! the device. Below the last one sits a PRIO qdisc with the three default bands, each served
//! by an SFQ leaf, plus one extra band per destination set. Rules with a destination set are
//! chained below their band, and a classification rule steers matching packets into it.
//!
//! For two global rules and two destination sets `A` and `B`:
//!
//! ```text
//!                root
//!                  │
//!          ┌───────▼───────┐
//!          │  1: netem     │   global rule #0
//!          └───────┬───────┘
//!          ┌───────▼───────┐
//!          │  2: netem     │   global rule #1
//!          └───────┬───────┘
//!          ┌───────▼───────┐
//!          │  3: prio      │   bands = 3 + 2
//!          └───────┬───────┘
//!   ┌─────────┬────┴────┬─────────┬─────────┐
//!  3:1       3:2       3:3       3:4       3:5
//!   │         │         │         │         │
//! 4: sfq    5: sfq    6: sfq   7: netem  8: netem
//!                               (set A)   (set B)
//! ```
//!
//! ## Handle Numbering Scheme
//!
//! Qdisc handles are allocated from a single counter, in creation order:
//!
//! | Component             | Handle        | Parent               |
//! |-----------------------|---------------|----------------------|
//! | Global rule `i`       | `i+1:`        | root, or `i:`        |
//! | PRIO multiplexer      | `g+1:`        | root, or `g:`        |
//! | Default SFQ leaves    | `g+2:..g+4:`  | `g+1:1..g+1:3`       |
//! | Filtered rules        | `g+5:` onward | `g+1:4+n`, or the previous rule of the same set |
//!
//! where `g` is the number of global rules and `n` the index of the destination set.

pub mod client;
pub mod codec;
pub mod flush;
pub mod handle;
pub mod operation;
pub mod plan;
pub mod qdisc;
