mod health_check;
mod mail_queue;
mod shutdown;
