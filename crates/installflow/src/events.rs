//! Wake sources multiplexed by the event loop.

use crossterm::event::Event;
use installflow_core::bridge::Callback;

use crate::host::HostIo;
use crate::Controller;

pub enum Wake {
    Callback(Callback<Controller>),
    Input(Event),
    InputClosed,
    Io(HostIo),
    Terminate,
}
