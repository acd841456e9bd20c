//! End-to-end scenario: an application store owning a list store, with a
//! derived count, shared app context, and devtools watching through the
//! per-thread emitter.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use storekeep::prelude::*;

struct App {
    name: &'static str,
}

struct TodoList {
    items: Observable<Vec<String>>,
    open: Computed<usize>,
    log: Rc<RefCell<Vec<String>>>,
}

impl TodoList {
    fn add(&self, item: &str) {
        self.items.update(|items| items.push(item.to_owned()));
    }
}

impl Store for TodoList {
    type Args = Rc<RefCell<Vec<String>>>;
    type Error = Infallible;

    fn construct(log: Self::Args, scope: &mut Scope<'_>) -> Result<Self, Infallible> {
        let items = Observable::new(Vec::<String>::new());
        let open = Computed::from_observable(&items, Vec::len);
        let _ = scope.register_owned(open.clone());

        let l = Rc::clone(&log);
        let app_name = scope.app::<App>().map_or("?", |app| app.name);
        scope.react(&items, move |items| {
            l.borrow_mut().push(format!("{app_name}: {} item(s)", items.len()));
        });
        Ok(Self { items, open, log })
    }

    fn on_dispose(&mut self) {
        self.log.borrow_mut().push("list closed".into());
    }
}

struct Shell {
    list: Rc<RefCell<Managed<TodoList>>>,
}

impl Store for Shell {
    type Args = (ManagedType<TodoList>, Rc<RefCell<Vec<String>>>);
    type Error = Infallible;

    fn construct((lists, log): Self::Args, scope: &mut Scope<'_>) -> Result<Self, Infallible> {
        scope.set_app(App { name: "todo" });
        let list = match lists.create(log) {
            Ok(list) => Rc::new(RefCell::new(list)),
            Err(err) => match err.into_parts().0 {},
        };
        let _ = scope.register_owned(Rc::clone(&list));
        Ok(Self { list })
    }
}

#[test]
fn store_tree_lifecycle() {
    std::thread::spawn(|| {
        let devtools = emitter();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _mounts = devtools.on_mount(move |event| s.borrow_mut().push(format!("+{}", event.tag)));
        let s = Rc::clone(&seen);
        let _unmounts =
            devtools.on_unmount(move |event| s.borrow_mut().push(format!("-{}", event.tag)));

        let context = AppContext::new();
        let lists = Factory::new("TodoList")
            .context(context.clone())
            .observe_default_emitter()
            .build::<TodoList>()
            .unwrap();
        let shells = Factory::new("Shell")
            .context(context.clone())
            .observe_default_emitter()
            .build::<Shell>()
            .unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut shell = shells.create((lists, Rc::clone(&log))).unwrap();
        let list = Rc::clone(&shell.list);

        list.borrow().add("milk");
        list.borrow().add("eggs");
        assert_eq!(list.borrow().open.get(), 2);
        assert_eq!(shell.app::<App>().unwrap().name, "todo");

        shell.dispose().unwrap();
        assert!(list.borrow().is_disposed());
        assert!(!list.borrow().open.is_attached());

        list.borrow().add("bread");
        assert_eq!(
            *log.borrow(),
            vec!["todo: 1 item(s)", "todo: 2 item(s)", "list closed"]
        );
        assert_eq!(*seen.borrow(), vec!["+TodoList", "+Shell", "-TodoList", "-Shell"]);
    })
    .join()
    .unwrap();
}

#[derive(Debug)]
struct Poller;

impl Store for Poller {
    type Args = ();
    type Error = storekeep::CapabilityError;

    fn construct(_: (), scope: &mut Scope<'_>) -> Result<Self, Self::Error> {
        scope.set_interval(std::time::Duration::from_secs(1), || {})?;
        Ok(Self)
    }
}

#[test]
fn missing_scheduler_error_is_reachable_from_facade_root() {
    let pollers = wrap::<Poller>("Poller").unwrap();
    let err = pollers.create(()).unwrap_err();
    assert_eq!(*err.error(), storekeep::CapabilityError::Missing("timers"));
    assert_eq!(
        *err.error(),
        storekeep::store_core::error::CapabilityError::Missing("timers")
    );
}
