//! Marker types selecting the frame walker's specializations at compile
//! time. Walk loops dispatch once on [`HFrame::is_interpreted`] and from there
//! on run monomorphized code.

use super::{sender::Sender, HFrame};
use crate::cont::ContMirror;

pub trait FrameKind: 'static {
    const INTERPRETED: bool;
    const NAME: &'static str;

    #[inline]
    fn is_instance(hf: &HFrame) -> bool {
        hf.is_interpreted() == Self::INTERPRETED
    }
}

/// Frames executed by the bytecode interpreter.
pub enum Interpreted {}

/// Frames of compiled code, described by a [`CodeBlob`](crate::code::CodeBlob).
pub enum Compiled {}

impl FrameKind for Interpreted {
    const INTERPRETED: bool = true;
    const NAME: &'static str = "interpreted";
}

impl FrameKind for Compiled {
    const INTERPRETED: bool = false;
    const NAME: &'static str = "compiled";
}

pub trait WalkMode: 'static {
    type Output;
    const NAME: &'static str;

    fn finish(sender: HFrame, mirror: &ContMirror) -> Self::Output;
}

/// Locates frame boundaries only.
pub enum Fast {}

/// Also decodes the sender's oop map and reports its reference count.
pub enum Full {}

impl WalkMode for Fast {
    type Output = HFrame;
    const NAME: &'static str = "fast";

    #[inline]
    fn finish(sender: HFrame, _mirror: &ContMirror) -> HFrame {
        sender
    }
}

impl WalkMode for Full {
    type Output = Sender;
    const NAME: &'static str = "full";

    #[inline]
    fn finish(sender: HFrame, mirror: &ContMirror) -> Sender {
        Sender {
            num_oops: sender.num_oops(mirror),
            frame: sender,
        }
    }
}
