mod contract;
mod tenancy;
