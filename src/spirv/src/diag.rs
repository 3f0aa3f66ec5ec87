//! Structural re-parse of transformed modules, used as a debug-build
//! sanity check. A failure here is logged by the caller and never
//! changes control flow; the validator proper lives outside this crate.

use log::trace;
use rspirv::binary::{Consumer, ParseAction};
use rspirv::dr;

/// Consumes the stream and keeps nothing; decoding is the check.
#[derive(Debug, Default)]
struct Sink {
    instructions: usize,
}

impl Consumer for Sink {
    fn initialize(&mut self) -> ParseAction {
        ParseAction::Continue
    }

    fn finalize(&mut self) -> ParseAction {
        ParseAction::Continue
    }

    fn consume_header(&mut self, _: dr::ModuleHeader) -> ParseAction {
        ParseAction::Continue
    }

    fn consume_instruction(&mut self, _: dr::Instruction) -> ParseAction {
        self.instructions += 1;
        ParseAction::Continue
    }
}

/// Checks that `words` still decode as a SPIR-V module.
pub fn validate_words(words: &[u32]) -> Result<(), String> {
    let mut sink = Sink::default();
    rspirv::binary::parse_words(words, &mut sink)
        .map_err(|err| format!("{:?}", err))?;
    trace!("validated module: {} instructions", sink.instructions);
    Ok(())
}
