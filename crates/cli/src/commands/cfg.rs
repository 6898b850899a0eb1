use anyhow::bail;
use clap::Args;
use murk_core::cfg_ir::{Block, EdgeType, Function, Module};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct CfgArgs {
    /// Module JSON file
    pub input: PathBuf,
    /// Only export this function (default: every function)
    #[arg(short, long)]
    function: Option<String>,
    /// Output file for Graphviz .dot (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl super::Command for CfgArgs {
    fn execute(self) -> anyhow::Result<()> {
        let module = super::load_module(&self.input)?;
        let dot = module_dot(&module, self.function.as_deref())?;
        super::write_output(self.output.as_deref(), &dot)
    }
}

/// Renders the selected functions of `module`, one `digraph` each.
pub fn module_dot(module: &Module, function: Option<&str>) -> anyhow::Result<String> {
    match function {
        Some(name) => match module.function(name) {
            Some(func) => Ok(generate_dot(func)),
            None => bail!("no function named {name}"),
        },
        None => Ok(module.functions.iter().map(generate_dot).collect()),
    }
}

/// Renders one function as a Graphviz digraph.
///
/// Blocks are `Mrecord` nodes with an HTML table label: a header row naming the block followed by
/// one row per statement. True edges are green, false edges red and everything else blue.
pub fn generate_dot(func: &Function) -> String {
    let mut dot = format!("digraph \"{}\" {{\n", escape_html(&func.name));
    dot.push_str("    node [shape=Mrecord, fontname=\"monospace\"];\n");

    for &node in &func.layout {
        let name = match func.block(node) {
            Block::Entry => "ENTRY".to_owned(),
            Block::Exit => "EXIT".to_owned(),
            Block::Body { .. } => format!("bb{}", node.index()),
        };
        let mut rows = vec![format!("<b>{name}</b>")];
        rows.extend(func.block(node).stmts().iter().map(|s| escape_html(&s.to_string())));
        let cells: String = rows
            .iter()
            .map(|r| format!("<tr><td align=\"left\">{r}</td></tr>"))
            .collect();
        let _ = writeln!(
            dot,
            "    n{} [label=<<table border=\"0\" cellborder=\"0\" cellspacing=\"0\">{}</table>>];",
            node.index(),
            cells
        );
    }

    for &node in &func.layout {
        for edge in func.succ_edges(node) {
            let (src, dst) = func.edge_endpoints(edge);
            let color = match func.edge_kind(edge) {
                EdgeType::BranchTrue => "green",
                EdgeType::BranchFalse => "red",
                _ => "blue",
            };
            let _ = writeln!(
                dot,
                "    n{} -> n{} [color={}];",
                src.index(),
                dst.index(),
                color
            );
        }
    }

    dot.push_str("}\n");
    dot
}

/// Escapes text for a Graphviz HTML label. `|` is escaped too since record shapes treat it as a
/// field separator.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '|' => out.push_str("&#124;"),
            _ => out.push(c),
        }
    }
    out
}
