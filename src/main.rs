//! # Blockflow CLI
//!
//! Usage:
//!   blockflow input.json -o layout.json
//!   echo '{ ... }' | blockflow
//!   blockflow --example > article.json
//!
//! Set `RUST_LOG=debug` to see pagination and float decisions.

use std::env;
use std::fs;
use std::io::{self, Read};

use blockflow::error::FlowError;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print!("{}", example_document_json());
        return;
    }

    if let Err(e) = run(&args) {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), FlowError> {
    let input = if args.len() > 1 && !args[1].starts_with('-') {
        fs::read_to_string(&args[1])?
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    };

    let output_path = args.windows(2).find(|w| w[0] == "-o").map(|w| w[1].clone());

    let result = blockflow::layout_json(&input)?;
    let json = serde_json::to_string_pretty(&result)?;
    match output_path {
        Some(path) => {
            fs::write(&path, &json)?;
            eprintln!(
                "✓ Laid out {:.2}pt of flow in {} regions; written to {}",
                result.height,
                result.regions.len().max(1),
                path
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn example_document_json() -> &'static str {
    r##"{
  "config": {
    "containerWidth": 300,
    "fragmentation": { "heights": [120] }
  },
  "root": {
    "kind": { "type": "Block" },
    "style": { "lineHeight": { "Length": 12 }, "orphans": 2, "widows": 2 },
    "children": [
      {
        "kind": { "type": "Block" },
        "id": "heading",
        "style": { "margin": { "top": { "Pt": 0 }, "right": { "Pt": 0 }, "bottom": { "Pt": 12 }, "left": { "Pt": 0 } } },
        "children": [
          { "kind": { "type": "Text", "content": "Floats and fragments" } }
        ]
      },
      {
        "kind": { "type": "Block" },
        "id": "body",
        "style": { "textAlign": "Justify" },
        "children": [
          {
            "kind": { "type": "Block" },
            "id": "figure",
            "style": { "float": "Right", "width": { "Pt": 80 }, "height": { "Pt": 60 } }
          },
          { "kind": { "type": "Text", "content": "Text wraps around the figure on the right, then takes the full width once it has passed below it. Lines that do not fit in a region move to the next one, and the last lines of the paragraph are kept together so that no single line is stranded at the top of a region." } },
          {
            "kind": { "type": "Inline" },
            "style": { "direction": "Rtl", "unicodeBidi": "Isolate" },
            "children": [
              { "kind": { "type": "Text", "content": " שלום עולם" } }
            ]
          }
        ]
      }
    ]
  }
}
"##
}
