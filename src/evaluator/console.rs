use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crate::runtime::error::RuntimeError;

/// Seam for `echo` and `input`. The interpreter binary talks to the real
/// terminal; tests and the program harness capture the echo stream instead.
pub trait Console {
    fn print_line(&mut self, line: &str);
    fn read_line(&mut self, prompt: Option<&str>) -> Result<String, RuntimeError>;
}

pub struct StdConsole;

impl Console for StdConsole {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }

    fn read_line(&mut self, prompt: Option<&str>) -> Result<String, RuntimeError> {
        if let Some(prompt) = prompt {
            print!("{prompt}");
            io::stdout().flush().ok();
        }
        let mut buffer = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut buffer)
            .map_err(|error| RuntimeError::IoFailed {
                operation: "read".to_string(),
                path: "stdin".to_string(),
                reason: error.to_string(),
            })?;
        if read == 0 {
            return Err(RuntimeError::InputEof);
        }
        while buffer.ends_with('\n') || buffer.ends_with('\r') {
            buffer.pop();
        }
        Ok(buffer)
    }
}

/// In-memory console. Cloning shares the underlying buffers, so a handle
/// kept outside the evaluator reads everything the script printed.
#[derive(Clone, Default)]
pub struct BufferedConsole {
    inner: Rc<RefCell<Buffers>>,
}

#[derive(Default)]
struct Buffers {
    output: Vec<String>,
    input: VecDeque<String>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&self, line: &str) {
        self.inner.borrow_mut().input.push_back(line.to_string());
    }

    pub fn output(&self) -> String {
        self.inner.borrow().output.join("\n")
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.inner.borrow().output.clone()
    }
}

impl Console for BufferedConsole {
    fn print_line(&mut self, line: &str) {
        self.inner.borrow_mut().output.push(line.to_string());
    }

    fn read_line(&mut self, prompt: Option<&str>) -> Result<String, RuntimeError> {
        let mut buffers = self.inner.borrow_mut();
        if let Some(prompt) = prompt {
            buffers.output.push(prompt.to_string());
        }
        buffers.input.pop_front().ok_or(RuntimeError::InputEof)
    }
}
