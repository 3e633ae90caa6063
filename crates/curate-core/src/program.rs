//! Curation programs: a small line-oriented language that sequences tasks
//! and branches on their status codes.
//!
//! ```text
//! @suspend batch %ERROR
//! checksum
//! if %FAIL
//!   report: fixity failure
//!   quarantine
//! elif %SKIP
//!   %SUCCESS
//! end
//! notify
//! ```
//!
//! A program compiles into a DAG of action nodes. Each edge carries the set
//! of status codes that follow it; a node without a matching edge ends the
//! run. Codes not claimed by any branch of an `if` block continue with the
//! statement after its `end`.

use std::fmt;

use async_trait::async_trait;
use curate_state::ContentObject;
use tracing::{debug, error};

use crate::curator::Curator;
use crate::descriptor::{Invoked, SuspendPolicy, TaskDescriptor};
use crate::error::{CurationError, Result};
use crate::resolver::TaskResolver;
use crate::status::{Status, StatusSet};
use crate::task::{CurationTask, TaskContext};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Literal(Status),
    Report(String),
    Task(String),
}

#[derive(Debug, Clone)]
struct Node {
    line: usize,
    action: Action,
    edges: Vec<(StatusSet, usize)>,
}

impl Node {
    fn successor(&self, status: Status) -> Option<usize> {
        self.edges
            .iter()
            .find(|(codes, _)| codes.contains(status))
            .map(|(_, next)| *next)
    }
}

/// Open `if` block during compilation.
struct Scope {
    line: usize,
    /// Exits that were pending when the block opened
    entry: Vec<(usize, StatusSet)>,
    /// Codes taken by `if`/`elif`/`else` so far
    claimed: StatusSet,
    /// Exits of the branches already closed
    tails: Vec<(usize, StatusSet)>,
    has_else: bool,
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Object(&'a ContentObject),
    Id(&'a str),
}

#[derive(Clone)]
pub struct Program {
    name: String,
    descriptor: TaskDescriptor,
    nodes: Vec<Node>,
    resolver: TaskResolver,
}

impl Program {
    /// Compile `source`. Task names are checked against `resolver`, which
    /// is also used to run them.
    pub async fn compile(name: &str, source: &str, resolver: TaskResolver) -> Result<Program> {
        let mut compiler = Compiler {
            resolver: &resolver,
            descriptor: TaskDescriptor::default(),
            nodes: Vec::new(),
            pending: Vec::new(),
            scopes: Vec::new(),
        };
        for (index, raw) in source.lines().enumerate() {
            if let Err(e) = compiler.statement(index + 1, raw.trim()).await {
                error!(program = name, error = %e, "program rejected");
                return Err(e);
            }
        }
        if let Some(scope) = compiler.scopes.last() {
            let e = compile_error(scope.line, "if without matching end");
            error!(program = name, error = %e, "program rejected");
            return Err(e);
        }
        if compiler.nodes.is_empty() {
            let e = compile_error(0, "program has no actions");
            error!(program = name, error = %e, "program rejected");
            return Err(e);
        }

        debug!(program = name, nodes = compiler.nodes.len(), "program compiled");
        let Compiler {
            descriptor, nodes, ..
        } = compiler;
        Ok(Program {
            name: name.to_string(),
            descriptor,
            nodes,
            resolver,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor built from the program's `@` annotations.
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// Names of the tasks the program may invoke, in source order.
    pub fn task_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.action {
                Action::Task(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    async fn execute(&self, cx: &mut TaskContext<'_>, target: Target<'_>) -> Result<Status> {
        let mut status = Status::Unset;
        let mut current = Some(0);
        while let Some(index) = current {
            let node = &self.nodes[index];
            let produced = match &node.action {
                Action::Literal(code) => *code,
                Action::Report(message) => {
                    cx.report(message)?;
                    status
                }
                Action::Task(task) => self.run_task(cx, task, target).await?,
            };
            if produced != Status::Unset {
                status = produced;
            }
            debug!(program = %self.name, line = node.line, status = %produced, "program step");
            current = node.successor(produced);
        }
        Ok(status)
    }

    /// Run one task through a Curator of its own, sharing the caller's
    /// context, reporter, properties and invocation mode.
    async fn run_task(
        &self,
        cx: &mut TaskContext<'_>,
        task: &str,
        target: Target<'_>,
    ) -> Result<Status> {
        let mut curator = Curator::new(self.resolver.clone());
        curator.set_reporter(cx.reporter());
        curator.set_properties(cx.properties());
        curator.set_recorder_factory(cx.recorder_factory());
        if let Some(mode) = cx.invoked() {
            curator.set_invoked(mode);
        }
        if !curator.add_task(task).await {
            return Ok(Status::NoTask);
        }

        match target {
            Target::Object(dso) => curator.perform_once(cx.context_mut(), dso).await?,
            Target::Id(id) => curator.perform_id_once(cx.context_mut(), id).await?,
        }
        let status = curator.status(task);
        if let Some(result) = curator.result(task) {
            cx.set_result(result.to_string());
        }
        curator.complete();
        Ok(status)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

#[async_trait]
impl CurationTask for Program {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        self.execute(cx, Target::Object(dso)).await
    }

    async fn perform_id(&mut self, cx: &mut TaskContext<'_>, id: &str) -> Result<Status> {
        self.execute(cx, Target::Id(id)).await
    }
}

fn compile_error(line: usize, message: impl Into<String>) -> CurationError {
    CurationError::Compile {
        line,
        message: message.into(),
    }
}

struct Compiler<'r> {
    resolver: &'r TaskResolver,
    descriptor: TaskDescriptor,
    nodes: Vec<Node>,
    /// Exits of the most recent statements, waiting for a successor
    pending: Vec<(usize, StatusSet)>,
    scopes: Vec<Scope>,
}

impl Compiler<'_> {
    async fn statement(&mut self, line: usize, text: &str) -> Result<()> {
        if text.is_empty() || text.starts_with('#') {
            return Ok(());
        }
        if let Some(annotation) = text.strip_prefix('@') {
            return self.annotation(line, annotation);
        }

        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (text, ""),
        };
        match keyword {
            "if" => self.open_if(line, parse_codes(line, rest)?),
            "elif" => {
                let codes = parse_codes(line, rest)?;
                self.branch(line, "elif", |claimed| codes.difference(claimed), codes)
            }
            "else" => {
                expect_no_args(line, "else", rest)?;
                let all = StatusSet::all();
                self.branch(line, "else", |claimed| all.difference(claimed), all)
            }
            "end" => {
                expect_no_args(line, "end", rest)?;
                self.close(line)
            }
            _ => {
                let action = self.action(line, text).await?;
                self.push(line, action);
                Ok(())
            }
        }
    }

    fn annotation(&mut self, line: usize, text: &str) -> Result<()> {
        let mut words = text.split_whitespace();
        match words.next() {
            Some("distributive") => self.descriptor.distributive = true,
            Some("mutative") => self.descriptor.mutative = true,
            Some("suspend") => {
                let mode: Invoked = words
                    .next()
                    .ok_or_else(|| compile_error(line, "@suspend needs a mode"))?
                    .parse()
                    .map_err(|e: String| compile_error(line, e))?;
                let codes = parse_codes(line, &words.collect::<Vec<_>>().join(" "))?;
                self.descriptor.suspend = Some(SuspendPolicy { mode, codes });
            }
            Some("record") => {
                let (Some(record_type), Some(value)) = (words.next(), words.next()) else {
                    return Err(compile_error(line, "@record needs a type, a value and codes"));
                };
                let codes = parse_codes(line, &words.collect::<Vec<_>>().join(" "))?;
                self.descriptor =
                    std::mem::take(&mut self.descriptor).record(record_type, value, codes);
            }
            Some(other) => return Err(compile_error(line, format!("unknown annotation @{other}"))),
            None => return Err(compile_error(line, "empty annotation")),
        }
        Ok(())
    }

    async fn action(&self, line: usize, text: &str) -> Result<Action> {
        if let Some(message) = text.strip_prefix("report:") {
            return Ok(Action::Report(message.trim().to_string()));
        }
        if text.starts_with('%') {
            return match text.parse::<Status>() {
                Ok(status @ (Status::Success | Status::Fail | Status::Skip | Status::Error)) => {
                    Ok(Action::Literal(status))
                }
                _ => Err(compile_error(line, format!("invalid status literal {text}"))),
            };
        }
        if text.split_whitespace().count() == 1 && self.resolver.can_resolve_task(text).await {
            return Ok(Action::Task(text.to_string()));
        }
        Err(compile_error(line, format!("unrecognized statement: {text}")))
    }

    fn push(&mut self, line: usize, action: Action) {
        let index = self.nodes.len();
        for (from, codes) in self.pending.drain(..) {
            self.nodes[from].edges.push((codes, index));
        }
        self.nodes.push(Node {
            line,
            action,
            edges: Vec::new(),
        });
        self.pending.push((index, StatusSet::all()));
    }

    fn open_if(&mut self, line: usize, codes: StatusSet) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(compile_error(line, "if without a preceding action"));
        }
        let entry = std::mem::take(&mut self.pending);
        self.pending = restrict(&entry, codes);
        self.scopes.push(Scope {
            line,
            entry,
            claimed: codes,
            tails: Vec::new(),
            has_else: false,
        });
        Ok(())
    }

    /// Start an `elif` or `else` branch. `effective` maps the codes claimed
    /// so far to the codes this branch actually takes.
    fn branch(
        &mut self,
        line: usize,
        keyword: &str,
        effective: impl FnOnce(StatusSet) -> StatusSet,
        claims: StatusSet,
    ) -> Result<()> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| compile_error(line, format!("{keyword} without if")))?;
        if scope.has_else {
            return Err(compile_error(line, format!("{keyword} after else")));
        }
        let codes = effective(scope.claimed);
        scope.claimed = scope.claimed.union(claims);
        scope.has_else = keyword == "else";
        scope.tails.append(&mut self.pending);
        self.pending = restrict(&scope.entry, codes);
        Ok(())
    }

    fn close(&mut self, line: usize) -> Result<()> {
        let mut scope = self
            .scopes
            .pop()
            .ok_or_else(|| compile_error(line, "end without if"))?;
        let unclaimed = StatusSet::all().difference(scope.claimed);
        let mut exits = std::mem::take(&mut scope.tails);
        exits.append(&mut self.pending);
        exits.extend(restrict(&scope.entry, unclaimed));
        self.pending = exits;
        Ok(())
    }
}

fn restrict(exits: &[(usize, StatusSet)], codes: StatusSet) -> Vec<(usize, StatusSet)> {
    exits
        .iter()
        .map(|(node, set)| (*node, set.intersection(codes)))
        .filter(|(_, set)| !set.is_empty())
        .collect()
}

fn parse_codes(line: usize, text: &str) -> Result<StatusSet> {
    StatusSet::parse(text).map_err(|e| compile_error(line, e))
}

fn expect_no_args(line: usize, keyword: &str, rest: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(compile_error(line, format!("{keyword} takes no arguments")))
    }
}
