// Bit-range annotations for the encoder. Purely a debugging device: when a
// BitWriter is created with annotations enabled, each field records its bit
// range and context path, and tests can render the whole stream as a
// labelled dump.

use std::ops::Range;

pub(crate) struct Annotations {
    context: Vec<String>,
    annotations: Vec<(Range<usize>, Vec<String>)>,
}

impl Annotations {
    pub(crate) fn new() -> Self {
        Annotations {
            context: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub(crate) fn push_context<T: ToString>(&mut self, context: T) {
        self.context.push(context.to_string());
    }

    pub(crate) fn pop_context(&mut self) {
        self.context.pop();
    }

    pub(crate) fn annotate<T: ToString>(&mut self, range: Range<usize>, name: T) {
        let mut ctx = self.context.clone();
        ctx.push(name.to_string());
        self.annotations.push((range, ctx));
    }

    #[cfg(test)]
    pub(crate) fn render_bitdump(&self, buf: &[u8]) -> String {
        use crate::bitcur::read_bits;
        use std::fmt::Write;

        let mut s = String::new();
        let mut pos = 0;
        for (r, name) in self.annotations.iter() {
            if r.is_empty() {
                continue;
            }
            let name = name.join(".");
            if r.start < pos {
                let _ = writeln!(s, "- ERROR: out-of-order range for {}", name);
            }
            if r.start > pos {
                let _ = writeln!(s, "- ERROR: unannotated ({} bits)", r.start - pos);
            }
            pos = r.end;
            let _ = write!(s, "- {} [{}..{}) ({} bits): ", name, r.start, r.end, r.len());
            let shown = r.len().min(64);
            for (n, bit) in r.clone().take(shown).enumerate() {
                if n > 0 && n % 8 == 0 {
                    s.push('_');
                }
                s.push(if read_bits(buf, bit, 1) != 0 { '1' } else { '0' });
            }
            if r.len() > shown {
                let _ = write!(s, "... ({} more)", r.len() - shown);
            }
            s.push('\n');
        }
        s
    }
}
