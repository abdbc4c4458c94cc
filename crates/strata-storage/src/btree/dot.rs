//! Graphviz export for debugging tree shape.

use super::constants::USABLE_SPACE;
use super::node::NodeBehavior;
use super::tree::Tree;
use std::io::Write;
use strata_common::{BlockId, Result};

impl<B: NodeBehavior> Tree<B> {
    /// Writes the tree as a DOT digraph.
    ///
    /// Each page becomes a record node labelled with its kind, fill and keys.
    /// Child links are solid edges; next-leaf links are dashed.
    pub fn export_dot<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "digraph {} {{", self.behavior.name())?;
        writeln!(out, "  node [shape=record, fontname=\"monospace\"];")?;

        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let page = self.load(id)?;
            let leaf = page.is_leaf();
            let n = page.num_cells();

            let keys = (0..n)
                .map(|i| self.behavior.read_key(&page, i, leaf).map(|k| k.to_string()))
                .collect::<Result<Vec<_>>>()?;
            let fill = self.live_bytes(&page)? * 100 / USABLE_SPACE;
            writeln!(
                out,
                "  p{} [label=\"{{{} {} ({}%)|{}}}\"];",
                id.0,
                if leaf { "leaf" } else { "internal" },
                id.0,
                fill,
                keys.join("|")
            )?;

            if leaf {
                if let Some(next) = BlockId::from_pointer(page.next_leaf()) {
                    writeln!(out, "  p{} -> p{} [style=dashed];", id.0, next.0)?;
                }
                continue;
            }
            for i in (0..=n).rev() {
                let child = self.child_at(id, &page, i)?;
                writeln!(out, "  p{} -> p{};", id.0, child.0)?;
                stack.push(child);
            }
        }

        writeln!(out, "}}")?;
        Ok(())
    }
}
