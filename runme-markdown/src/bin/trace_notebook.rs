/// Notebook Tracer - Shows how a Markdown notebook splits into blocks
///
/// Usage: cargo run --bin trace_notebook <markdown-file>

use runme_core::Block;
use runme_markdown::{parse, render};
use std::fs;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin trace_notebook <markdown-file>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin trace_notebook README.md");
        std::process::exit(1);
    }

    let md_path = &args[1];

    println!("╔═══════════════════════════════════════════════════════════════");
    println!("║ RUNME NOTEBOOK TRACER");
    println!("╚═══════════════════════════════════════════════════════════════\n");

    let content = match fs::read_to_string(md_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {}", md_path, e);
            std::process::exit(1);
        }
    };

    let document = match parse(&content) {
        Ok(doc) => doc,
        Err(e) => {
            println!("❌ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    println!("📄 FRONT MATTER:");
    println!("─────────────────────────────────────────────────────────────");
    match document.front_matter() {
        Some(fm) => {
            println!("Keys: {}", fm.mapping().len());
            println!("Document id: {}", fm.identity().unwrap_or("<none>"));
            println!("Version: {}", fm.version().unwrap_or("<none>"));
            if let Some(path) = fm.session_document_path() {
                println!("Session outputs of: {}", path);
            }
        }
        None => println!("<none>"),
    }
    println!();

    println!("🧱 BLOCKS:");
    println!("─────────────────────────────────────────────────────────────");
    let mut cell_index = 0;
    for block in document.blocks() {
        match block {
            Block::Prose(prose) => {
                println!("prose  {} bytes", prose.as_str().len());
            }
            Block::Cell(cell) => {
                println!(
                    "cell #{} lang={} name={} id={} attrs={}",
                    cell_index,
                    cell.language().unwrap_or("-"),
                    cell.name().unwrap_or("-"),
                    cell.identity().unwrap_or("-"),
                    cell.attributes().to_compact_json(),
                );
                cell_index += 1;
            }
        }
    }
    println!();

    let duplicates = document.duplicate_cell_ids();
    if !duplicates.is_empty() {
        println!("⚠️  Duplicate cell ids: {}", duplicates.join(", "));
        println!();
    }

    println!("🔄 ROUND-TRIP TEST:");
    println!("─────────────────────────────────────────────────────────────");
    match render(&document) {
        Ok(rendered) if rendered == content => println!("✅ Byte-identical"),
        Ok(rendered) => {
            println!("❌ Output differs ({} vs {} bytes)", rendered.len(), content.len());
            std::process::exit(1);
        }
        Err(e) => {
            println!("❌ Render error: {}", e);
            std::process::exit(1);
        }
    }
}
