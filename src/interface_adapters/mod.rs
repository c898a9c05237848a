// Interface adapters: line protocol, sockets, clocks and recording files.

pub mod clock;
pub mod net;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod utils;
