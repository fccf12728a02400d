mod ledger;

pub use ledger::{
    CreateCategoryError, CreatePeriodError, DynLedgerRepo, ExpenseUpdate, LedgerRepo,
    PeriodClose, PeriodRecordCounts,
};
