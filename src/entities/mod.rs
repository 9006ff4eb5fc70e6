// Catalog (read-only keys for the ledger)
pub mod material_category;
pub mod material_variant;

// Procurement documents
pub mod goods_receipt_note;
pub mod grn_line;
pub mod vendor;
pub mod vendor_invoice;
pub mod vendor_invoice_decision;
pub mod vendor_purchase_order;
pub mod vendor_purchase_order_line;

// Stock ledger
pub mod stock_batch;
pub mod stock_transaction;

// Requisitions
pub mod requisition;
pub mod requisition_batch_allocation;
pub mod requisition_line;
