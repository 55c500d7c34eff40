//! The evaluator
//!
//! A stackless machine: all pending work is recorded as continuations
//! on an explicit stack, so deep evaluation never recurses on the
//! native call stack and the depth limit is a simple length check.
//! Each step pops one continuation and either proceeds with it (when
//! the output register is empty) or resumes it with the value in the
//! output register.

use itertools::Itertools;

use crate::eval::{
    error::ExecutionError,
    memory::{
        cell::{ActionRef, Antiform, Cell, Kind, Sigil},
        collect::{self, CollectStats, CollectorHeapView, GcScannable},
        context::{self, make_error, make_frame, make_sea, sea_define, Location},
        flavor::Flavor,
        heap::{Heap, HeapStats},
        heart::Heart,
        stub::{Flex, StubId},
        symbol::{sym, SymbolId, SymbolTable},
    },
    mold,
    scan,
    settings::EvalSettings,
};

use super::{
    bind::{self, Chain},
    cont::{Continuation, Feed},
    metrics::{Clock, Metrics, ThreadOccupation},
    native::{native_for, NativeMachine, Outcome, NATIVES},
};

/// The state of the machine (stack and registers)
#[derive(Default)]
pub struct MachineState {
    /// Stack of continuations
    stack: Vec<Continuation>,
    /// Output register; empty while work is in progress
    out: Option<Cell>,
    /// Arguments of the native currently executing
    data_stack: Vec<Cell>,
    /// Termination flag. Set when the stack is exhausted
    terminated: bool,
}

impl MachineState {
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Abandon all pending work
    fn reset(&mut self) {
        self.stack.clear();
        self.data_stack.clear();
        self.out = None;
        self.terminated = true;
    }
}

impl GcScannable for MachineState {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        let mut grey = vec![];
        for cont in &self.stack {
            grey.extend(cont.scan(marker));
        }
        if let Some(out) = &self.out {
            grey.extend(out.scan(marker));
        }
        grey.extend(self.data_stack.scan(marker));
        grey
    }
}

/// Everything the collector must treat as live
struct Roots<'a> {
    state: &'a MachineState,
    modules: [StubId; 2],
}

impl GcScannable for Roots<'_> {
    fn scan(&self, marker: &mut CollectorHeapView<'_>) -> Vec<StubId> {
        let mut grey = self.state.scan(marker);
        grey.extend(marker.mark_all(self.modules));
        grey
    }
}

/// The evaluator
///
/// GC roots (outside heap, pointing in) are:
/// - the continuation stack
/// - the output register and data stack
/// - the `lib` and `user` modules
/// - the heap's protection stack
pub struct Machine {
    heap: Heap,
    symbols: SymbolTable,
    state: MachineState,
    /// Module of natives and keywords
    lib: StubId,
    /// Module that loaded code is bound to; inherits from `lib`
    user: StubId,
    settings: EvalSettings,
    metrics: Metrics,
    clock: Clock,
}

impl Machine {
    /// Construct a machine with `lib` populated
    pub fn new(settings: EvalSettings) -> Result<Self, ExecutionError> {
        let mut clock = Clock::default();
        clock.switch(ThreadOccupation::Initialisation);

        let mut heap = settings
            .heap_limit
            .map(Heap::with_limit)
            .unwrap_or_default();
        if let Some(ballast) = settings.gc_ballast {
            heap.set_ballast(ballast);
        }
        let mut symbols = SymbolTable::new();

        let lib = make_sea(&mut heap, None)?;
        let user = make_sea(&mut heap, Some(lib))?;

        for (i, native) in NATIVES.iter().enumerate() {
            let name = symbols.intern(native.name());
            let action = Cell::action(ActionRef::Native(i as u16));
            sea_define(&mut heap, &mut symbols, lib, name, action)?;
        }
        sea_define(&mut heap, &mut symbols, lib, sym::NULL, Cell::null())?;
        sea_define(&mut heap, &mut symbols, lib, sym::OKAY, Cell::okay())?;

        log::debug!("machine initialised: {} natives", NATIVES.len());
        clock.stop();

        Ok(Machine {
            heap,
            symbols,
            state: MachineState::default(),
            lib,
            user,
            settings,
            metrics: Metrics::default(),
            clock,
        })
    }

    /// Scan source text into a block bound to `user`
    pub fn load(&mut self, text: &str) -> Result<StubId, ExecutionError> {
        let block = scan::transcode(&mut self.heap, &mut self.symbols, text)?;
        bind::bind_deep(&mut self.heap, block, self.user)?;
        Ok(block)
    }

    /// Load and evaluate source text
    pub fn do_source(&mut self, text: &str) -> Result<Cell, ExecutionError> {
        let block = self.load(text)?;
        self.do_block(block)
    }

    /// Evaluate a block from its head, returning the value of its last
    /// expression
    pub fn do_block(&mut self, block: StubId) -> Result<Cell, ExecutionError> {
        self.state.reset();
        self.state.terminated = false;
        self.push(Continuation::Sequence {
            feed: Feed::new(block, 0, Chain::empty()),
            product: Cell::ghost(),
        })?;
        self.run(self.settings.step_limit)
    }

    /// Run the machine until termination or step limit
    pub fn run(&mut self, limit: Option<usize>) -> Result<Cell, ExecutionError> {
        self.clock.switch(ThreadOccupation::Mutator);

        let gc_check_freq = self.settings.gc_check_frequency.max(1);
        let start = self.metrics.ticks();

        while !self.state.terminated {
            if let Some(limit) = limit {
                if (self.metrics.ticks() - start) as usize >= limit {
                    self.state.reset();
                    self.clock.stop();
                    return Err(ExecutionError::DidntTerminate(limit));
                }
            }

            if self.metrics.ticks() % gc_check_freq == 0 && self.heap.policy_requires_collection()
            {
                self.recycle()?;
            }

            if let Err(e) = self.step() {
                if let Err(e) = self.unwind(e) {
                    self.clock.stop();
                    return Err(e);
                }
            }
        }

        if self.heap.policy_requires_collection() {
            self.recycle()?;
        }

        self.clock.stop();

        Ok(self.state.out.take().unwrap_or_else(Cell::ghost))
    }

    /// Execute one step
    pub fn step(&mut self) -> Result<(), ExecutionError> {
        if self.settings.trace_steps {
            let stack = self.state.stack.iter().rev().format(":");
            log::trace!(
                "M ⟪{}⟫ <{}>",
                self.state.out.map_or("_".to_string(), |c| c.kind().to_string()),
                stack
            );
        }

        self.metrics.tick();
        self.metrics.stack(self.state.stack.len());

        let cont = match self.state.stack.pop() {
            Some(cont) => cont,
            None => {
                self.state.terminated = true;
                return Ok(());
            }
        };

        match self.state.out.take() {
            Some(value) => self.resume(cont, value),
            None => self.proceed(cont),
        }
    }

    /// Push a new continuation onto the stack
    fn push(&mut self, cont: Continuation) -> Result<(), ExecutionError> {
        if self.state.stack.len() >= self.settings.max_depth {
            return Err(ExecutionError::StackOverflow(self.settings.max_depth));
        }
        self.state.stack.push(cont);
        Ok(())
    }

    /// Do the next piece of work for a continuation
    fn proceed(&mut self, cont: Continuation) -> Result<(), ExecutionError> {
        match cont {
            Continuation::Sequence { feed, product } => {
                if feed.index as usize >= self.heap.cells(feed.array)?.len() {
                    self.state.out = Some(product);
                } else {
                    let level = self.state.stack.len();
                    self.push(Continuation::Sequence { feed, product })?;
                    self.push(Continuation::Eval { level })?;
                }
            }
            Continuation::Eval { level } => match self.next_cell(level)? {
                Some((cell, chain)) => self.evaluate_cell(cell, chain, level)?,
                None => return Err(ExecutionError::NoArg("expression".to_string())),
            },
            Continuation::Call {
                action,
                label,
                args,
                arity,
                meta,
                level,
            } => {
                if args.len() >= arity {
                    return self.invoke(action, args);
                }
                if self.feed_exhausted(level)? {
                    return Err(ExecutionError::NoArg(self.label_name(label)));
                }
                self.push(Continuation::Call {
                    action,
                    label,
                    args,
                    arity,
                    meta,
                    level,
                })?;
                self.push(Continuation::Eval { level })?;
            }
            // only meaningful with a value
            Continuation::Assign { .. } => {
                return Err(ExecutionError::NoArg("assignment".to_string()))
            }
            Continuation::Trap { .. } => self.state.out = Some(Cell::ghost()),
            Continuation::Produce { value } => self.state.out = Some(value),
        }
        Ok(())
    }

    /// Pass a value to a continuation
    fn resume(&mut self, cont: Continuation, value: Cell) -> Result<(), ExecutionError> {
        match cont {
            Continuation::Sequence { feed, product } => {
                let at_end = feed.index as usize >= self.heap.cells(feed.array)?.len();
                if !at_end && value.antiform_class() == Some(Antiform::Raised) {
                    // a raised error that nothing uses fails
                    value.decay(&self.heap)?;
                }
                let product = if value.is_ghost() { product } else { value };
                self.push(Continuation::Sequence { feed, product })?;
            }
            Continuation::Eval { .. } => self.state.out = Some(value),
            Continuation::Call {
                action,
                label,
                mut args,
                arity,
                meta,
                level,
            } => {
                let arg = if meta {
                    value.meta(&mut self.heap)?
                } else {
                    match value.decay(&self.heap) {
                        Err(ExecutionError::NoValue) => {
                            return Err(ExecutionError::NoArg(self.label_name(label)))
                        }
                        other => other?,
                    }
                };
                args.push(arg);
                self.push(Continuation::Call {
                    action,
                    label,
                    args,
                    arity,
                    meta,
                    level,
                })?;
            }
            Continuation::Assign { location } => {
                let value = value.decay(&self.heap)?;
                context::write(&mut self.heap, location, value)?;
                self.state.out = Some(value);
            }
            Continuation::Trap { .. } => {
                self.state.out = Some(match value.antiform_class() {
                    Some(Antiform::Raised) => value
                        .context()
                        .map(Cell::error)
                        .ok_or(ExecutionError::NoValue)?,
                    _ => value,
                });
            }
            Continuation::Produce { value } => self.state.out = Some(value),
        }
        Ok(())
    }

    /// Take the next cell from the feed of the sequence at `level`
    fn next_cell(&mut self, level: usize) -> Result<Option<(Cell, Chain)>, ExecutionError> {
        let feed = self.feed(level)?;
        let cell = self
            .heap
            .cells(feed.array)?
            .get(feed.index as usize)
            .copied();
        if cell.is_some() {
            self.set_feed(
                level,
                Feed {
                    index: feed.index + 1,
                    ..feed
                },
            )?;
        }
        Ok(cell.map(|c| (c, feed.chain)))
    }

    fn feed_exhausted(&self, level: usize) -> Result<bool, ExecutionError> {
        let feed = self.feed(level)?;
        Ok(feed.index as usize >= self.heap.cells(feed.array)?.len())
    }

    fn feed(&self, level: usize) -> Result<Feed, ExecutionError> {
        match self.state.stack.get(level) {
            Some(Continuation::Sequence { feed, .. }) => Ok(*feed),
            _ => Err(ExecutionError::Panic(format!("no sequence at level {}", level))),
        }
    }

    fn set_feed(&mut self, level: usize, new: Feed) -> Result<(), ExecutionError> {
        match self.state.stack.get_mut(level) {
            Some(Continuation::Sequence { feed, .. }) => {
                *feed = new;
                Ok(())
            }
            _ => Err(ExecutionError::Panic(format!("no sequence at level {}", level))),
        }
    }

    fn label_name(&self, label: Option<SymbolId>) -> String {
        label.map_or_else(
            || "action".to_string(),
            |s| self.symbols.resolve(s).to_string(),
        )
    }

    /// Evaluate a single cell taken from a feed
    fn evaluate_cell(&mut self, cell: Cell, chain: Chain, level: usize) -> Result<(), ExecutionError> {
        let value = match cell.kind() {
            Kind::Quoted => {
                let inner = cell.unquotify(&self.heap, 1)?;
                bind::derive(&self.heap, &self.symbols, inner, chain)?
            }
            Kind::Quasi => cell.anti()?,
            Kind::Anti(_) => cell,
            Kind::Plain(Heart::Word) => match cell.sigil().unwrap_or(Sigil::None) {
                Sigil::None => {
                    let value = bind::fetch(&self.heap, &self.symbols, &cell, chain)?;
                    match value.action_ref() {
                        Some(action) if value.is_antiform() => {
                            return self.begin_call(action, cell.symbol(), level)
                        }
                        _ => value,
                    }
                }
                Sigil::Set => {
                    let location =
                        bind::resolve_for_set(&mut self.heap, &mut self.symbols, &cell, chain)?;
                    self.push(Continuation::Assign { location })?;
                    return self.push(Continuation::Eval { level });
                }
                Sigil::Get => {
                    let location = bind::resolve(&self.heap, &self.symbols, &cell, chain)?;
                    context::read(&self.heap, location)?
                }
                Sigil::Meta => {
                    let value = bind::fetch(&self.heap, &self.symbols, &cell, chain)?;
                    value.meta(&mut self.heap)?
                }
            },
            Kind::Plain(Heart::Group) => {
                let group = bind::derive(&self.heap, &self.symbols, cell, chain)?;
                let (array, index) = group.series().ok_or(ExecutionError::NoValue)?;
                return self.push(Continuation::Sequence {
                    feed: Feed::new(array, index, Chain::from_node(group.binding())),
                    product: Cell::ghost(),
                });
            }
            Kind::Plain(Heart::Tuple) | Kind::Plain(Heart::Path) => {
                self.evaluate_selection(cell, chain)?
            }
            Kind::Plain(Heart::Comma) => Cell::ghost(),
            Kind::Plain(_) => bind::derive(&self.heap, &self.symbols, cell, chain)?,
        };
        self.state.out = Some(value);
        Ok(())
    }

    /// `a.b.c`: fields of contexts and (1-based) items of arrays
    fn evaluate_selection(&mut self, cell: Cell, chain: Chain) -> Result<Cell, ExecutionError> {
        let (stub, index) = cell.series().ok_or(ExecutionError::NoValue)?;
        let items = self.heap.cells(stub)?[index as usize..].to_vec();
        let (head, rest) = items
            .split_first()
            .ok_or_else(|| ExecutionError::type_mismatch("word!", "empty path"))?;

        let mut value = bind::fetch(&self.heap, &self.symbols, head, chain)?;
        for selector in rest {
            value = match (value.context(), selector.symbol(), selector.as_integer()) {
                (Some(ctx), Some(symbol), _) => {
                    match context::find(&self.heap, &self.symbols, ctx, symbol)? {
                        Some(location) => context::read(&self.heap, location)?,
                        None => {
                            return Err(ExecutionError::NotBound(
                                self.symbols.resolve(symbol).to_string(),
                            ))
                        }
                    }
                }
                (None, _, Some(n)) if value.heart().is_any_array() => {
                    let (array, at) = value.series().ok_or(ExecutionError::NoValue)?;
                    if n < 1 {
                        Cell::null()
                    } else {
                        let offset = (n - 1)
                            .checked_add(at as i64)
                            .and_then(|o| usize::try_from(o).ok())
                            .ok_or(ExecutionError::Overflow)?;
                        self.heap
                            .cells(array)?
                            .get(offset)
                            .copied()
                            .unwrap_or_else(Cell::null)
                    }
                }
                _ => {
                    return Err(ExecutionError::type_mismatch(
                        "context or array",
                        value.kind().to_string(),
                    ))
                }
            };
        }
        Ok(value)
    }

    /// Start gathering arguments for an action found in the feed
    fn begin_call(
        &mut self,
        action: ActionRef,
        label: Option<SymbolId>,
        level: usize,
    ) -> Result<(), ExecutionError> {
        let (arity, meta) = match native_for(action) {
            Some(native) if native.binds_feed() => return self.bind_let(level),
            Some(native) => (native.arity(), native.meta_args()),
            None => (self.composed_arity(action)?, false),
        };
        self.push(Continuation::Call {
            action,
            label,
            args: Vec::with_capacity(arity),
            arity,
            meta,
            level,
        })
    }

    /// `let x: ...` introduces `x` for the rest of the feed
    fn bind_let(&mut self, level: usize) -> Result<(), ExecutionError> {
        let (target, chain) = self
            .next_cell(level)?
            .ok_or_else(|| ExecutionError::NoArg("let".to_string()))?;
        let symbol = match (target.symbol(), target.sigil(), target.kind()) {
            (Some(symbol), Some(Sigil::Set), Kind::Plain(_)) => symbol,
            _ => {
                return Err(ExecutionError::type_mismatch(
                    "set-word!",
                    target.kind().to_string(),
                ))
            }
        };

        let chain = chain.push_let(&mut self.heap, symbol, Cell::trash())?;
        let feed = self.feed(level)?;
        self.set_feed(level, Feed { chain, ..feed })?;

        let node = chain
            .node()
            .ok_or_else(|| ExecutionError::Panic("let produced an empty chain".into()))?;
        self.push(Continuation::Assign {
            location: Location::new(node, 0),
        })?;
        self.push(Continuation::Eval { level })
    }

    fn composed_arity(&self, action: ActionRef) -> Result<usize, ExecutionError> {
        match action {
            ActionRef::Composed(details) => {
                let keylist = self
                    .heap
                    .stub(details)?
                    .link()
                    .stub()
                    .ok_or(ExecutionError::NoValue)?;
                Ok(self.heap.stub(keylist)?.symbols().len())
            }
            ActionRef::Native(i) => Err(ExecutionError::Panic(format!("unknown native {}", i))),
        }
    }

    /// Run an action once its arguments are gathered
    fn invoke(&mut self, action: ActionRef, args: Vec<Cell>) -> Result<(), ExecutionError> {
        match action {
            ActionRef::Native(i) => {
                let native = native_for(action)
                    .ok_or_else(|| ExecutionError::Panic(format!("unknown native {}", i)))?;
                let base = self.state.data_stack.len();
                self.state.data_stack.extend_from_slice(&args);
                let outcome = native.execute(self, &args);
                self.state.data_stack.truncate(base);
                if let Outcome::Value(value) = outcome? {
                    self.state.out = Some(value);
                }
                Ok(())
            }
            ActionRef::Composed(details) => {
                let stub = self.heap.stub(details)?;
                let keylist = stub.link().stub().ok_or(ExecutionError::NoValue)?;
                let body = stub
                    .cells()
                    .first()
                    .copied()
                    .ok_or(ExecutionError::NoValue)?;
                let (array, index) = body.series().ok_or(ExecutionError::NoValue)?;

                let frame = make_frame(&mut self.heap, keylist, &args, details)?;
                // the frame comes first, then whatever the body captured
                let chain = match body.binding() {
                    Some(captured) => Chain::from_node(Some(captured)).push_use(&mut self.heap, frame)?,
                    None => Chain::empty().push_frame(frame),
                };

                self.push(Continuation::Sequence {
                    feed: Feed::new(array, index, chain),
                    product: Cell::ghost(),
                })
            }
        }
    }

    /// Unwind to the innermost trap, leaving an error value as the
    /// trap's product; errors with no trap (or that may not be
    /// trapped) abandon evaluation
    fn unwind(&mut self, error: ExecutionError) -> Result<(), ExecutionError> {
        let trap = if error.is_recoverable() {
            self.state
                .stack
                .iter()
                .rposition(|c| matches!(c, Continuation::Trap { .. }))
        } else {
            None
        };

        let pos = match trap {
            Some(pos) => pos,
            None => {
                log::debug!("uncaught error: {}", error);
                self.state.reset();
                return Err(error);
            }
        };

        if let Continuation::Trap {
            data_height,
            guard_height,
            manuals_height,
        } = self.state.stack[pos]
        {
            self.state.stack.truncate(pos);
            self.state.data_stack.truncate(data_height);
            self.heap.truncate_guards(guard_height);
            let freed = self.heap.free_manuals_above(manuals_height);
            log::debug!("trapped {} (freed {} manual stubs)", error.id(), freed);
        }

        let ctx = match error {
            ExecutionError::Raised(ctx) => ctx,
            other => make_error(&mut self.heap, &mut self.symbols, &other, None)?,
        };
        self.state.out = Some(Cell::error(ctx));
        Ok(())
    }

    /// Collect garbage, treating the machine state as roots
    pub fn recycle(&mut self) -> Result<CollectStats, ExecutionError> {
        let roots = Roots {
            state: &self.state,
            modules: [self.lib, self.user],
        };
        let stats = collect::collect(
            &roots,
            &mut self.heap,
            &mut self.symbols,
            &mut self.clock,
            self.settings.dump_heap,
        )?;
        self.metrics.collection(stats.swept);
        self.clock.switch(ThreadOccupation::Mutator);
        Ok(stats)
    }

    /// Keep `id` alive across collections until unprotected
    pub fn protect(&mut self, id: StubId) {
        self.heap.protect(id)
    }

    pub fn unprotect(&mut self, id: StubId) {
        self.heap.unprotect(id)
    }

    /// Access the heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.symbols.intern(name)
    }

    /// A managed block of the given cells
    pub fn alloc_block(&mut self, cells: Vec<Cell>) -> Result<Cell, ExecutionError> {
        let block = self.heap.alloc_flex(Flavor::Source, Flex::Cells(cells))?;
        self.heap.manage(block)?;
        Ok(Cell::block(block))
    }

    pub fn mold(&self, cell: &Cell) -> Result<String, ExecutionError> {
        mold::mold(&self.heap, &self.symbols, cell)
    }

    pub fn lib(&self) -> StubId {
        self.lib
    }

    pub fn user(&self) -> StubId {
        self.user
    }

    /// Variable of a name in `user` (or `lib`)
    pub fn resolve(&mut self, name: &str) -> Result<Location, ExecutionError> {
        let word = Cell::word(self.symbols.intern(name)).with_binding(Some(self.user))?;
        bind::resolve(&self.heap, &self.symbols, &word, Chain::empty())
    }

    /// Value of a name in `user` (or `lib`)
    pub fn fetch(&mut self, name: &str) -> Result<Cell, ExecutionError> {
        let word = Cell::word(self.symbols.intern(name)).with_binding(Some(self.user))?;
        bind::fetch(&self.heap, &self.symbols, &word, Chain::empty())
    }

    /// Access the metrics (ticks, stack depth, collections)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Return clock for access to GC timings
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    /// Has the machine terminated
    pub fn terminated(&self) -> bool {
        self.state.terminated()
    }
}

impl NativeMachine for Machine {
    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn symbols(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    fn memory(&mut self) -> (&mut Heap, &mut SymbolTable) {
        (&mut self.heap, &mut self.symbols)
    }

    fn push(&mut self, cont: Continuation) -> Result<(), ExecutionError> {
        Machine::push(self, cont)
    }

    fn checkpoint(&self) -> Continuation {
        Continuation::Trap {
            data_height: self.state.data_stack.len(),
            guard_height: self.heap.guards_height(),
            manuals_height: self.heap.manuals_height(),
        }
    }

    fn recycle(&mut self) -> Result<CollectStats, ExecutionError> {
        Machine::recycle(self)
    }
}
