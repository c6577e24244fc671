//! Contracts, query planning, CRUD and relationship services over the registry and a store.

mod contract;
mod crud;
mod planner;
mod relations;
pub use contract::{derive_create_contract, derive_update_contract, ContractBuilder, CreateContract, Record, Slot, UpdateContract};
pub use crud::CrudService;
pub use planner::{
    compare_values, plan, value_eq, FilterClause, Page, QueryOptions, QueryPlan, SearchClause, SortClause,
    SortDirection, DEFAULT_LIMIT, MAX_LIMIT,
};
pub use relations::{Relation, RelationService};
