//! Operator-mode CLI handlers for `orgchart plan` subcommands.
//!
//! Implements:
//! - `orgchart plan list`                -- list every plan
//! - `orgchart plan show <plan-id>`      -- show a plan's metadata and nodes
//! - `orgchart plan export <plan-id>`    -- write a plan as CSV
//! - `orgchart plan delete <plan-id>`    -- delete a plan (never `current`)

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use orgchart_core::permission::Caller;
use orgchart_core::plan::Plan;
use orgchart_core::service::PlanService;

use crate::PlanCommands;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    service: &PlanService,
    operator: &Caller,
) -> Result<()> {
    match command {
        PlanCommands::List => cmd_list(service, operator).await,
        PlanCommands::Show { plan_id } => cmd_show(service, operator, &plan_id).await,
        PlanCommands::Export { plan_id, output } => {
            cmd_export(service, operator, &plan_id, output.as_deref()).await
        }
        PlanCommands::Delete { plan_id } => {
            service.delete_plan(operator, &plan_id).await?;
            println!("Plan {plan_id} deleted.");
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------
// orgchart plan list
// -----------------------------------------------------------------------

async fn cmd_list(service: &PlanService, operator: &Caller) -> Result<()> {
    let view = service.list_all_plans(operator).await?;

    if view.plans.is_empty() {
        println!("No plans found.");
        return Ok(());
    }

    let id_w = view.plans.keys().map(String::len).max().unwrap_or(2).max(2);
    let name_w = view
        .plans
        .values()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);
    let period_w = view
        .plans
        .values()
        .map(|p| p.period.chars().count())
        .max()
        .unwrap_or(6)
        .max(6);

    println!(
        "{:<id_w$}  {:<name_w$}  {:<period_w$}  {:>5}",
        "ID", "NAME", "PERIOD", "NODES",
    );
    for (id, plan) in &view.plans {
        println!(
            "{:<id_w$}  {:<name_w$}  {:<period_w$}  {:>5}",
            id,
            plan.name,
            plan.period,
            plan.nodes.len(),
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// orgchart plan show <plan-id>
// -----------------------------------------------------------------------

async fn cmd_show(service: &PlanService, operator: &Caller, plan_id: &str) -> Result<()> {
    let view = service.list_all_plans(operator).await?;
    let plan = view
        .plans
        .get(plan_id)
        .with_context(|| format!("plan {plan_id:?} not found"))?;

    println!("Plan: {}", plan.name);
    println!("  ID:      {plan_id}");
    println!("  Period:  {}", plan.period);
    if !plan.memo.is_empty() {
        println!("  Memo:    {}", plan.memo);
    }
    println!("  Nodes:   {}", plan.nodes.len());

    if plan.nodes.is_empty() {
        return Ok(());
    }
    println!();
    for line in tree_lines(plan) {
        println!("  {line}");
    }
    Ok(())
}

/// Render the node forest depth-first, roots in plan order. Nodes whose
/// parent is missing are listed as roots; nodes on a parent cycle are
/// listed once at the end.
fn tree_lines(plan: &Plan) -> Vec<String> {
    let ids: HashSet<&str> = plan.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut lines = Vec::new();
    let mut seen = HashSet::new();

    fn visit<'a>(
        plan: &'a Plan,
        idx: usize,
        depth: usize,
        seen: &mut HashSet<&'a str>,
        lines: &mut Vec<String>,
    ) {
        let node = &plan.nodes[idx];
        if !seen.insert(node.id.as_str()) {
            return;
        }
        let title = if node.position.is_empty() {
            node.name.clone()
        } else {
            format!("{} ({})", node.name, node.position)
        };
        lines.push(format!("{}{} [{}]", "  ".repeat(depth), title, node.id));
        for (child, _) in plan
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent_id.as_deref() == Some(node.id.as_str()))
        {
            visit(plan, child, depth + 1, seen, lines);
        }
    }

    for (idx, node) in plan.nodes.iter().enumerate() {
        let is_root = node
            .parent_id
            .as_deref()
            .is_none_or(|p| !ids.contains(p));
        if is_root {
            visit(plan, idx, 0, &mut seen, &mut lines);
        }
    }
    for idx in 0..plan.nodes.len() {
        visit(plan, idx, 0, &mut seen, &mut lines);
    }
    lines
}

// -----------------------------------------------------------------------
// orgchart plan export <plan-id>
// -----------------------------------------------------------------------

async fn cmd_export(
    service: &PlanService,
    operator: &Caller,
    plan_id: &str,
    output: Option<&str>,
) -> Result<()> {
    let export = service.export_csv(operator, plan_id).await?;

    match output {
        Some(path) => {
            let path = if Path::new(path).is_dir() {
                Path::new(path).join(&export.filename)
            } else {
                PathBuf::from(path)
            };
            std::fs::write(&path, &export.content)
                .with_context(|| format!("cannot write output file: {}", path.display()))?;
            eprintln!("Exported plan {plan_id} to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(export.content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
