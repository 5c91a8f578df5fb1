// Call and return

use crate::diagnostics::Violation;
use crate::interpreter::engine::Simulator;
use crate::interpreter::memory_ops::check_storable;
use crate::memory::value::Value;
use crate::program::{Operand, Param};

impl Simulator {
    /// Push a frame for `function` and declare its parameters. Arguments are
    /// evaluated in the caller before the frame exists.
    pub(crate) fn call(
        &mut self,
        index: usize,
        function: &str,
        params: &[Param],
        result: Option<&str>,
    ) -> Result<(), Violation> {
        let args = params
            .iter()
            .map(|param| {
                let arg = self.value_operand(&param.arg)?;
                check_storable(&param.name, param.size, &arg)?;
                Ok(arg)
            })
            .collect::<Result<Vec<Value>, Violation>>()?;

        self.frames.push_frame(
            &self.space,
            function,
            result.map(str::to_string),
            Some(index),
        );
        for (param, arg) in params.iter().zip(args) {
            if let Err(violation) = self.declare_slot(&param.name, param.size, Some(arg)) {
                self.frames.discard_frame(&mut self.space);
                return Err(violation);
            }
        }
        Ok(())
    }

    /// Pop the current frame. Its record stays behind, dead, so pointers into
    /// it are reported as dangling rather than reading reused stack bytes.
    pub(crate) fn ret(&mut self, index: usize, value: Option<&Operand>) -> Result<(), Violation> {
        let value = value.map(|op| self.value_operand(op)).transpose()?;
        let frame = self.frames.pop_frame(&mut self.space, index)?;
        let function = frame.function.clone();
        let return_to = frame.return_to.clone();

        match (return_to, value) {
            (Some(handle), Some(value)) => self.bind(&handle, value),
            (Some(handle), None) => {
                // A later use of the handle is reported as unbound
                log::debug!("{}() returned no value for '{}'", function, handle);
                self.registers.remove(&handle);
            }
            (None, _) => {}
        }
        Ok(())
    }
}
